//! Security register read/program/erase/lock.
//!
//! Operations are gated on `num` lying in the device's supported range and
//! `address + size` fitting within one security block. Dispatch by family
//! (§4.16): the {GD, Winbond, XMCC, XTX, Puya} group shares opcodes
//! 48/42/44h; `XMCB` uses 68/62/64h instead (see
//! [`FlashType::uses_alt_security_opcodes`]).

use super::command;
use super::descriptor::{CpidType, FlashDescriptor, UidType};
use super::port::SpiFlashPort;
use super::{FlashError, FlashErrorKind};

/// SFDP byte offset the unique id lives at for the one family that falls
/// back to it rather than a dedicated 4Bh-8/4Bh-16 variant. No property
/// table row currently selects [`UidType::SfdpFallback`], this exists so
/// the dispatch in [`read_uid`] is total over [`UidType`].
const SFDP_UID_OFFSET: u32 = 0x10;

fn check_bounds(d: &FlashDescriptor, num: u8, address: usize, size: usize) -> Result<(), FlashError> {
    if num < d.sreg_min_num || num > d.sreg_max_num {
        return Err(FlashError::new(FlashErrorKind::OutOfRange));
    }
    if address + size > d.sreg_block_size {
        return Err(FlashError::new(FlashErrorKind::OutOfRange));
    }
    Ok(())
}

fn physical_address(num: u8, address: usize) -> u32 {
    ((num as u32) << 12) | address as u32
}

pub fn read(
    port: &mut dyn SpiFlashPort,
    d: &FlashDescriptor,
    num: u8,
    address: usize,
    len: usize,
) -> Result<Vec<u8>, FlashError> {
    check_bounds(d, num, address, len)?;
    let phys = physical_address(num, address);
    Ok(command::security_read(
        port,
        d.flash_type.uses_alt_security_opcodes(),
        phys,
        len,
    ))
}

pub fn program(
    port: &mut dyn SpiFlashPort,
    d: &FlashDescriptor,
    num: u8,
    address: usize,
    data: &[u8],
) -> Result<(), FlashError> {
    check_bounds(d, num, address, data.len())?;
    let phys = physical_address(num, address);
    command::write_enable(port);
    command::security_program(port, d.flash_type.uses_alt_security_opcodes(), phys, data);
    Ok(())
}

pub fn erase(port: &mut dyn SpiFlashPort, d: &FlashDescriptor, num: u8) -> Result<(), FlashError> {
    check_bounds(d, num, 0, 0)?;
    let phys = physical_address(num, 0);
    command::write_enable(port);
    command::security_erase(port, d.flash_type.uses_alt_security_opcodes(), phys);
    Ok(())
}

/// Lock bit position for security register `num` on this device's family.
/// `GD` uses `SR12 LB1 + (num - 1)`; `XTX` uses a single `SR12 LB` bit;
/// `XMCB` uses a separate Function Register accessed through 48h/42h with
/// an `IRL0 + num` bit.
fn lock_bit(d: &FlashDescriptor, num: u8) -> u8 {
    use super::descriptor::FlashType::*;
    match d.flash_type {
        Gd | Winbond | Xmcc | Puya => 1 + (num - 1),
        Xtx => 1,
        Xmca => 1 + (num - 1),
        Xmcb => num,
    }
}

/// Set the lock bit for security register `num`, permanently (on real
/// hardware) preventing further program/erase to it.
pub fn lock(port: &mut dyn SpiFlashPort, d: &FlashDescriptor, num: u8) -> Result<(), FlashError> {
    if num < d.sreg_min_num || num > d.sreg_max_num {
        return Err(FlashError::new(FlashErrorKind::OutOfRange));
    }
    let bit = lock_bit(d, num);

    if d.flash_type == super::descriptor::FlashType::Xmcb {
        let fr_addr = 0u32;
        let mut fr = command::security_read(port, true, fr_addr, 1)[0];
        fr |= 1 << bit;
        command::write_enable(port);
        command::security_program(port, true, fr_addr, &[fr]);
        return Ok(());
    }

    let sr2 = command::read_sr2(port);
    command::write_sr2(port, sr2 | (1 << bit));
    Ok(())
}

/// Clear the lock bit for security register `num`. Debug-only, real
/// hardware may not support unlocking a permanently-locked register, but
/// the in-memory mock does, so the lock invariant is still testable.
pub fn unlock(port: &mut dyn SpiFlashPort, d: &FlashDescriptor, num: u8) -> Result<(), FlashError> {
    if num < d.sreg_min_num || num > d.sreg_max_num {
        return Err(FlashError::new(FlashErrorKind::OutOfRange));
    }
    let bit = lock_bit(d, num);

    if d.flash_type == super::descriptor::FlashType::Xmcb {
        let fr_addr = 0u32;
        let mut fr = command::security_read(port, true, fr_addr, 1)[0];
        fr &= !(1 << bit);
        command::write_enable(port);
        command::security_program(port, true, fr_addr, &[fr]);
        return Ok(());
    }

    let sr2 = command::read_sr2(port);
    command::write_sr2(port, sr2 & !(1 << bit));
    Ok(())
}

/// Read the device's unique id, dispatching on [`FlashDescriptor::uid_type`]
/// per the external interface's `UID (4Bh-8)` / `UID (4Bh-16)` / SFDP
/// fallback variants.
pub fn read_uid(port: &mut dyn SpiFlashPort, d: &FlashDescriptor) -> Vec<u8> {
    match d.uid_type {
        UidType::Uid8 => command::read_uid8(port).to_vec(),
        UidType::Uid16 => command::read_uid16(port).to_vec(),
        UidType::SfdpFallback => command::read_sfdp(port, SFDP_UID_OFFSET, 8),
    }
}

/// Read the device's customer product id, if it has one. `None` if
/// [`FlashDescriptor::cpid_type`] is [`CpidType::None`], absence of the
/// feature rather than a command failure.
pub fn read_cpid(port: &mut dyn SpiFlashPort, d: &FlashDescriptor) -> Option<u16> {
    match d.cpid_type {
        CpidType::Standard => Some(command::read_uid_cpid(port).1),
        CpidType::None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flash::descriptor::lookup;
    use crate::flash::port::MockPort;

    #[test]
    fn program_then_read_round_trips() {
        let d = lookup([0xC8, 0x40, 0x17]).unwrap();
        let mut port = MockPort::new([0xC8, 0x40, 0x17], 4096);
        program(&mut port, &d, 1, 0, &[1, 2, 3, 4]).unwrap();
        let out = read(&mut port, &d, 1, 0, 4).unwrap();
        assert_eq!(out, vec![1, 2, 3, 4]);
    }

    #[test]
    fn erase_resets_to_erased_pattern() {
        let d = lookup([0xC8, 0x40, 0x17]).unwrap();
        let mut port = MockPort::new([0xC8, 0x40, 0x17], 4096);
        program(&mut port, &d, 1, 0, &[1, 2, 3, 4]).unwrap();
        erase(&mut port, &d, 1).unwrap();
        let out = read(&mut port, &d, 1, 0, 4).unwrap();
        assert_eq!(out, vec![0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn out_of_range_num_rejected() {
        let d = lookup([0xC8, 0x40, 0x17]).unwrap();
        let mut port = MockPort::new([0xC8, 0x40, 0x17], 4096);
        let err = program(&mut port, &d, 99, 0, &[1]).unwrap_err();
        assert_eq!(err.kind(), FlashErrorKind::OutOfRange);
    }

    #[test]
    fn out_of_range_address_rejected() {
        let d = lookup([0xC8, 0x40, 0x17]).unwrap();
        let mut port = MockPort::new([0xC8, 0x40, 0x17], 4096);
        let err = program(&mut port, &d, 1, d.sreg_block_size - 1, &[1, 2]).unwrap_err();
        assert_eq!(err.kind(), FlashErrorKind::OutOfRange);
    }

    #[test]
    fn lock_then_unlock_round_trips_bit() {
        let d = lookup([0xC8, 0x40, 0x17]).unwrap();
        let mut port = MockPort::new([0xC8, 0x40, 0x17], 4096);
        lock(&mut port, &d, 1).unwrap();
        let locked = command::read_sr2(&mut port);
        assert_ne!(locked & (1 << lock_bit(&d, 1)), 0);
        unlock(&mut port, &d, 1).unwrap();
        let unlocked = command::read_sr2(&mut port);
        assert_eq!(unlocked & (1 << lock_bit(&d, 1)), 0);
    }

    #[test]
    fn read_uid_dispatches_on_descriptor_width() {
        // GD rows are Uid16.
        let d16 = lookup([0xC8, 0x40, 0x17]).unwrap();
        let mut port16 = MockPort::new([0xC8, 0x40, 0x17], 4096);
        port16.uid = [9; 16];
        assert_eq!(read_uid(&mut port16, &d16), vec![9; 16]);

        // Winbond rows are Uid8.
        let d8 = lookup([0xEF, 0x40, 0x17]).unwrap();
        let mut port8 = MockPort::new([0xEF, 0x40, 0x17], 4096);
        port8.uid = [5; 16];
        assert_eq!(read_uid(&mut port8, &d8), vec![5; 8]);
    }

    #[test]
    fn read_cpid_is_none_for_devices_without_one() {
        let d = lookup([0x20, 0x40, 0x16]).unwrap(); // XMCC: CpidType::None
        let mut port = MockPort::new([0x20, 0x40, 0x16], 4096);
        assert_eq!(read_cpid(&mut port, &d), None);
    }

    #[test]
    fn read_cpid_returns_configured_value_for_standard_devices() {
        let d = lookup([0xC8, 0x40, 0x17]).unwrap(); // GD: CpidType::Standard
        let mut port = MockPort::new([0xC8, 0x40, 0x17], 4096);
        port.cpid = 0x1234;
        assert_eq!(read_cpid(&mut port, &d), Some(0x1234));
    }

    #[test]
    fn xmcb_uses_alternate_opcodes() {
        let d = lookup([0x1D, 0x40, 0x16]).unwrap();
        let mut port = MockPort::new([0x1D, 0x40, 0x16], 4096);
        program(&mut port, &d, 1, 0, &[9]).unwrap();
        let last = port.history.last().unwrap();
        assert_eq!(last.opcode, command::opcode::SECURITY_PROGRAM_XMCB);
    }
}
