//! Status-register engine: read/write SR1/SR2, volatile-SR dance, WIP
//! polling, and the prepare/finish envelope around erase/program ops.

use super::command;
use super::descriptor::{DeviceFlags, FlashDescriptor};
use super::port::SpiFlashPort;
use super::wp;

const WIP_BIT: u8 = 1 << 0;

/// 16-bit status register: SR2 in the high byte if the device has one,
/// otherwise just SR1.
pub fn read_sr(port: &mut dyn SpiFlashPort, d: &FlashDescriptor) -> u16 {
    let sr1 = command::read_sr1(port);
    if d.flags.contains(DeviceFlags::HAS_SR2) {
        let sr2 = command::read_sr2(port);
        ((sr2 as u16) << 8) | sr1 as u16
    } else {
        sr1 as u16
    }
}

/// Write the status register via the non-volatile path appropriate to the
/// device's SR shape (§4.13).
pub fn write_sr(port: &mut dyn SpiFlashPort, d: &FlashDescriptor, sr: u16) {
    let lo = sr as u8;
    let hi = (sr >> 8) as u8;

    if !d.flags.contains(DeviceFlags::HAS_SR2) {
        command::write_sr1(port, lo);
        return;
    }

    if d.flags.contains(DeviceFlags::WRITE_SR12) {
        command::write_sr_wide(port, lo, hi);
        return;
    }

    command::write_sr1(port, lo);
    wait_wip_finish(port, d);
    command::write_enable(port);
    command::write_sr2(port, hi);
    wait_wip_finish(port, d);
}

/// Write the status register via the volatile path: wraps every attempt
/// with the 50h volatile-enable prelude and loops until a readback
/// confirms the value, since volatile writes can silently fail on some
/// devices. Unlike [`write_sr`], does not wait on WIP between attempts;
/// the asymmetry between the two paths is deliberate.
pub fn write_volatile_sr(port: &mut dyn SpiFlashPort, d: &FlashDescriptor, sr: u16) {
    loop {
        command::volatile_write_enable(port);
        let lo = sr as u8;
        command::write_sr1(port, lo);
        if d.flags.contains(DeviceFlags::HAS_SR2) {
            command::volatile_write_enable(port);
            command::write_sr2(port, (sr >> 8) as u8);
        }
        if read_sr(port, d) == sr {
            return;
        }
    }
}

/// Debounces a known glitch: reads SR1 twice with a short gap, returning
/// `true` only if WIP is clear on both reads.
pub fn is_wip_finished(port: &mut dyn SpiFlashPort) -> bool {
    let first = command::read_sr1(port);
    std::thread::sleep(std::time::Duration::from_micros(1));
    let second = command::read_sr1(port);
    (first & WIP_BIT) == 0 && (second & WIP_BIT) == 0
}

pub fn wait_wip_finish(port: &mut dyn SpiFlashPort, _d: &FlashDescriptor) {
    while !is_wip_finished(port) {
        std::thread::sleep(std::time::Duration::from_micros(1));
    }
}

/// Unprotect the target range (if the device supports volatile SR) and
/// drive WREN, ahead of a program/erase command. Callers issue the
/// command itself and [`finish_erase_program`] afterwards.
pub fn prepare_erase_program(
    port: &mut dyn SpiFlashPort,
    d: &FlashDescriptor,
    offset: usize,
    size: usize,
) {
    if d.flags.contains(DeviceFlags::VOLATILE_SR_EN) {
        let current = read_sr(port, d);
        let relaxed = wp::relaxed_sr_for_range(d, current, offset, size);
        if relaxed != current {
            write_volatile_sr(port, d, relaxed);
        }
    }
    command::write_enable(port);
}

/// Restore protect-all SR state after a program/erase command, if the
/// device supports volatile SR.
pub fn finish_erase_program(port: &mut dyn SpiFlashPort, d: &FlashDescriptor) {
    if d.flags.contains(DeviceFlags::VOLATILE_SR_EN) {
        let current = read_sr(port, d);
        let protect_all = wp::protect_all_sr(d, current);
        if protect_all != current {
            write_volatile_sr(port, d, protect_all);
        }
    }
}
