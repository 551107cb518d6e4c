//! Human-readable port report.
//!
//! Verbosity levels are cumulative:
//! - `0`: one status line
//! - `1`: identity, poll interval, max current, strings
//! - `2`: HID class descriptor summary and endpoint table
//! - `3`: packet count
//! - `4`: last raw report in hex

use crate::metadata::DeviceMeta;
use crate::snapshot::PortSnapshot;
use std::fmt::Write;

/// Render `snap` at `verbosity`.
pub fn describe(snap: &PortSnapshot, verbosity: u8) -> String {
    let mut out = String::new();
    // writing into a String cannot fail
    let _ = render(&mut out, snap, verbosity);
    out
}

fn render(out: &mut String, snap: &PortSnapshot, verbosity: u8) -> std::fmt::Result {
    writeln!(
        out,
        "{}: {}",
        snap.port,
        if snap.connected { "connected" } else { "disconnected" }
    )?;
    if verbosity == 0 {
        return Ok(());
    }

    writeln!(out, "          Vendor ID: 0x{:04X}", snap.vendor_id)?;
    writeln!(out, "         Product ID: 0x{:04X}", snap.product_id)?;
    writeln!(out, "   Interface number: {}", snap.interface_number)?;
    writeln!(out, "      Poll interval: {:.3} ms", snap.poll_interval_ms)?;
    if let Some(meta) = &snap.meta {
        writeln!(out, "    Maximum current: {} mA", meta.max_power_ma)?;
        writeln!(out, "       Manufacturer: \"{}\"", meta.manufacturer)?;
        writeln!(out, "            Product: \"{}\"", meta.product)?;
        writeln!(out, "      Serial number: \"{}\"", meta.serial_number)?;
    }
    if let Some(err) = &snap.last_error {
        writeln!(out, "         Last error: {err}")?;
    }

    if verbosity >= 2 {
        if let Some(meta) = &snap.meta {
            render_descriptors(out, meta)?;
        }
    }

    if verbosity >= 3 {
        writeln!(out, "       Packet Count: {}", snap.packet_count)?;
    }

    if verbosity >= 4 {
        write!(out, "    ")?;
        for b in &snap.last_report {
            write!(out, " {b:02X}")?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn render_descriptors(out: &mut String, meta: &DeviceMeta) -> std::fmt::Result {
    match &meta.hid {
        Some(hid) => {
            writeln!(
                out,
                "           HID Code: {:02X}.{:02X}",
                hid.bcd_hid >> 8,
                hid.bcd_hid & 0xFF
            )?;
            writeln!(
                out,
                "   HID Country Code: {}{}",
                hid.country_code,
                if hid.country_code == 0 { " (Non-localized)" } else { "" }
            )?;
            writeln!(out, "  HID # Descriptors: {}", hid.num_descriptors)?;
            writeln!(out, "  HID Report Length: {}", hid.report_descriptor_len)?;
        }
        None => writeln!(
            out,
            "     Interface class {} has no HID descriptor",
            meta.interface_class
        )?,
    }

    for ep in &meta.endpoints {
        writeln!(out, "   Endpoint descriptor:")?;
        writeln!(
            out,
            "              Endpoint: {} ({})",
            ep.number,
            if ep.direction_in { "IN" } else { "OUT" }
        )?;
        writeln!(out, "                  Type: {}", ep.transfer_type)?;
        writeln!(out, "       Synchronization: {}", ep.sync_type)?;
        writeln!(out, "                 Usage: {}", ep.usage_type)?;
        writeln!(out, "       Max packet size: {}", ep.max_packet_size)?;
        writeln!(
            out,
            "             bInterval: {} ({:.3} ms)",
            ep.interval,
            ep.interval_ms()
        )?;
    }
    Ok(())
}
