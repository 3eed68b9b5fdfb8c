//! CSV output formatting.

use crate::import::ImportSummary;
use crate::storage::PersistedDevice;
use std::io::{self, Write};

fn opt<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map_or(String::new(), ToString::to_string)
}

/// Write one row per device.
pub fn write_devices<W: Write>(out: W, devices: &[PersistedDevice]) -> io::Result<()> {
    let mut wtr = csv::Writer::from_writer(out);

    wtr.write_record([
        "id",
        "ip",
        "mac",
        "state",
        "device_id",
        "model",
        "device_type",
        "nickname",
        "fw_ver",
        "rssi",
        "first_seen",
        "last_seen",
    ])?;

    for device in devices {
        wtr.write_record([
            device.id.to_string(),
            device.ip.clone(),
            opt(&device.mac),
            opt(&device.state),
            opt(&device.device_id),
            opt(&device.model),
            opt(&device.device_type),
            opt(&device.nickname),
            opt(&device.fw_ver),
            opt(&device.rssi),
            device.first_seen.to_rfc3339(),
            device.last_seen.to_rfc3339(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

/// Write the summary as a header plus a single row.
pub fn write_summary<W: Write>(out: W, summary: &ImportSummary) -> io::Result<()> {
    let mut wtr = csv::Writer::from_writer(out);

    wtr.write_record([
        "import_id",
        "range",
        "live_hosts",
        "vendor_devices",
        "imported",
        "skipped",
        "interrupted",
        "started_at",
        "duration_ms",
    ])?;
    wtr.write_record([
        summary.import_id.to_string(),
        summary.range.clone(),
        summary.live_hosts.to_string(),
        summary.vendor_devices.to_string(),
        summary.imported.to_string(),
        summary.skipped.to_string(),
        summary.interrupted.to_string(),
        summary.started_at.to_rfc3339(),
        summary.duration_ms.to_string(),
    ])?;

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::tests::{sample_device, sample_summary};

    #[test]
    fn test_devices_csv_quotes_nicknames() {
        let mut device = sample_device();
        device.nickname = Some("Lamp, desk".into());

        let mut buf = Vec::new();
        write_devices(&mut buf, &[device]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();

        assert!(lines.next().unwrap().starts_with("id,ip,mac,state"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("7,192.168.1.20,6C:5A:B0:01:02:0F,up,"));
        assert!(row.contains("\"Lamp, desk\""));
        assert!(row.contains(",-51,"));
    }

    #[test]
    fn test_summary_csv() {
        let mut buf = Vec::new();
        write_summary(&mut buf, &sample_summary()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let row = text.lines().nth(1).unwrap();
        assert!(row.contains(",192.168.1.0/24,3,1,1,2,false,"));
    }
}
