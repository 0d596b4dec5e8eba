//! Write-protect range mapping.
//!
//! Per-vendor tables map a requested offset to the SR bits that protect
//! "from here to the top of the chip" at whatever granularity the status
//! register actually offers, coarser than an arbitrary byte range.
//! `GD` tables scale with capacity in quarter-chip steps (1/2/4/8/16 MiB
//! parts); `XMCA` tables are normalised to 1/128ths of capacity, per
//! §4.14. The table's terminating `offset_in_unit = 0` row is the
//! whole-chip-protected sentinel: asking to protect from address 0 always
//! resolves to it, protecting `[0, capacity)`.

use super::descriptor::{FlashDescriptor, WpType};

/// SR granularity unit: a 4 KiB sector, matching the smallest erase size
/// the status-register bits can independently gate.
pub const UNIT_BYTES: usize = 4096;

#[derive(Clone, Copy, Debug)]
pub struct WpEntry {
    pub offset_in_unit: usize,
    pub sr_bits: u16,
}

/// The protected byte range [`start`, `end`) a device currently enforces,
/// or would enforce after applying [`relaxed_sr_for_range`]/
/// [`protect_all_sr`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct WpRange {
    pub start: usize,
    pub end: usize,
}

fn gd_table(capacity: usize) -> Vec<WpEntry> {
    let units = capacity / UNIT_BYTES;
    vec![
        WpEntry {
            offset_in_unit: units * 3 / 4,
            sr_bits: 0b0111_0000,
        },
        WpEntry {
            offset_in_unit: units / 2,
            sr_bits: 0b0110_0000,
        },
        WpEntry {
            offset_in_unit: units / 4,
            sr_bits: 0b0101_0000,
        },
        WpEntry {
            offset_in_unit: 0,
            sr_bits: 0b0111_1100, // whole-chip protect sentinel
        },
    ]
}

fn xmca_table(capacity: usize) -> Vec<WpEntry> {
    let units = capacity / UNIT_BYTES;
    vec![
        WpEntry {
            offset_in_unit: units - units / 128,
            sr_bits: 0b0011_1100,
        },
        WpEntry {
            offset_in_unit: units / 2,
            sr_bits: 0b0010_1100,
        },
        WpEntry {
            offset_in_unit: 0,
            sr_bits: 0b0011_1111, // whole-chip protect sentinel
        },
    ]
}

fn table_for(d: &FlashDescriptor) -> Option<Vec<WpEntry>> {
    match d.wp_type {
        WpType::Gd => Some(gd_table(d.capacity)),
        WpType::Xmca => Some(xmca_table(d.capacity)),
        WpType::None => None,
    }
}

fn whole_chip_sentinel(table: &[WpEntry]) -> &WpEntry {
    table
        .iter()
        .find(|e| e.offset_in_unit == 0)
        .expect("every wp table terminates with an offset_in_unit = 0 row")
}

/// The protected window a caller would observe after requesting
/// protection starting at `offset` for `size` bytes. Devices with no WP
/// table (`wp_type == None`) report the whole chip as unprotectable
/// (`start == end == 0`).
pub fn wp_range(d: &FlashDescriptor, offset: usize, _size: usize) -> WpRange {
    let Some(table) = table_for(d) else {
        return WpRange { start: 0, end: 0 };
    };

    if offset == 0 {
        return WpRange {
            start: 0,
            end: d.capacity,
        };
    }

    let query_unit = offset.div_ceil(UNIT_BYTES);
    let boundary = table
        .iter()
        .filter(|e| e.offset_in_unit != 0 && e.offset_in_unit >= query_unit)
        .map(|e| e.offset_in_unit)
        .min();

    match boundary {
        Some(units) => WpRange {
            start: units * UNIT_BYTES,
            end: d.capacity,
        },
        None => WpRange {
            start: d.capacity,
            end: d.capacity,
        },
    }
}

/// SR bits (merged into `current`'s untouched high bits) that unprotect
/// `[offset, offset + size)` by selecting the coarsest boundary at or
/// above the range's end, everything below stays unprotected, the rest
/// of the chip stays as protected as that row allows. No-op (`current`
/// unchanged) for devices without a WP table.
pub fn relaxed_sr_for_range(d: &FlashDescriptor, current: u16, offset: usize, size: usize) -> u16 {
    let Some(table) = table_for(d) else {
        return current;
    };
    let end_unit = (offset + size).div_ceil(UNIT_BYTES);
    let row = table
        .iter()
        .filter(|e| e.offset_in_unit >= end_unit)
        .min_by_key(|e| e.offset_in_unit)
        .unwrap_or_else(|| whole_chip_sentinel(&table));
    (current & !0xFF00) | row.sr_bits
}

/// SR bits that protect the entire chip, for the vendor's table.
/// No-op for devices without a WP table.
pub fn protect_all_sr(d: &FlashDescriptor, current: u16) -> u16 {
    let Some(table) = table_for(d) else {
        return current;
    };
    let row = whole_chip_sentinel(&table);
    (current & !0xFF00) | row.sr_bits
}
