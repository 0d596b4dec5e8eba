//! Vendor-dispatched initialisation (§4.17): identify the part, bind its
//! descriptor, then run whatever family-specific status-check dance that
//! vendor's parts need before they're safe to use.

use log::error;

use super::command;
use super::descriptor::{lookup, DeviceFlags, FlashDescriptor, FlashType, WpType};
use super::port::SpiFlashPort;
use super::status;
use super::wp;

const WEL_BIT: u8 = 1 << 1;
const WIP_BIT: u8 = 1 << 0;
const QE_BIT: u8 = 1 << 1; // SR2 bit 1
const SUS1_BIT: u8 = 1 << 7;
const SUS2_BIT: u8 = 1 << 7; // SR2 bit 7

/// Identify the attached part and bring it into a known state.
///
/// Reads the JEDEC ID, looks it up in the property table, and panics if no
/// vendor byte is recognised at all, an unknown chip is a fatal
/// configuration error (§7), not a recoverable one. Mismatched-but-close
/// ids (scenario 7) bind via the coarser fallback tiers in
/// [`descriptor::lookup`] instead of failing here.
pub fn init(port: &mut dyn SpiFlashPort) -> FlashDescriptor {
    let id = command::read_id(port);
    let d = match lookup(id) {
        Some(d) => d,
        None => {
            error!("unrecognised flash JEDEC id {:02x} {:02x} {:02x}", id[0], id[1], id[2]);
            panic!("unrecognised flash JEDEC id");
        }
    };

    match d.flash_type {
        FlashType::Gd | FlashType::Winbond | FlashType::Xmcc | FlashType::Xtx | FlashType::Puya => {
            gd_family_status_check(port, &d);
        }
        FlashType::Xmca => xmca_status_check(port, &d),
        FlashType::Xmcb => xmcb_status_check(port, &d),
    }

    d
}

/// Shared status-check routine for the GD-alike family: if any stray
/// WEL/WIP/suspend state is left over from a previous session, issue one
/// combined chip reset rather than unwinding each bit individually (a
/// suspended operation resumed with RESUME is not in the same state as
/// one cleared by RESET, so the two are not interchangeable remediations
/// for the same stale bits). Afterwards, set QE, and optionally lock the
/// whole chip down if the device has a WP table.
fn gd_family_status_check(port: &mut dyn SpiFlashPort, d: &FlashDescriptor) {
    let sr1 = command::read_sr1(port);
    let sr2 = if d.flags.contains(DeviceFlags::HAS_SR2) {
        command::read_sr2(port)
    } else {
        0
    };

    let sr1_reset_mask = WEL_BIT
        | WIP_BIT
        | if d.flags.contains(DeviceFlags::HAS_SUS1) {
            SUS1_BIT
        } else {
            0
        };
    let sr2_reset_mask = if d.flags.contains(DeviceFlags::HAS_SUS2) {
        SUS2_BIT
    } else {
        0
    };

    if sr1 & sr1_reset_mask != 0 || sr2 & sr2_reset_mask != 0 {
        command::reset_enable(port);
        command::reset(port);
        std::thread::sleep(std::time::Duration::from_micros(30));
        status::wait_wip_finish(port, d);
    }

    if d.flags.contains(DeviceFlags::HAS_SR2) {
        let sr2 = command::read_sr2(port);
        if sr2 & QE_BIT == 0 {
            command::write_sr2(port, sr2 | QE_BIT);
            status::wait_wip_finish(port, d);
        }
    }

    if d.wp_type == WpType::Gd {
        let current = status::read_sr(port, d);
        let protected = wp::protect_all_sr(d, current);
        if protected != current {
            status::write_sr(port, d, protected);
            status::wait_wip_finish(port, d);
        }
    }
}

const OTP_ENTER: u8 = 0x3A;
const TB_BIT: u8 = 1 << 3;
const EBL_BIT: u8 = 1 << 6;
const SRP_BIT: u8 = 1 << 7;
const BP0_BIT: u8 = 1 << 2;
const BP1_BIT: u8 = 1 << 4;
const BP_MASK: u8 = BP0_BIT | BP1_BIT;

/// XMCA status check: reset, enter OTP mode to read the factory TB bit,
/// conditionally set it (waiting for the write to land before leaving OTP
/// mode), exit OTP, then set the BP bits while clearing `EBL`/`SRP` so the
/// part is locked down and writable on first use.
fn xmca_status_check(port: &mut dyn SpiFlashPort, d: &FlashDescriptor) {
    command::reset_enable(port);
    command::reset(port);

    command::cmd(port, OTP_ENTER, &[], 0, Default::default());
    let otp_sr = command::read_sr1(port);
    let needs_tb = otp_sr & TB_BIT == 0;
    if needs_tb {
        command::write_sr1(port, otp_sr | TB_BIT);
        status::wait_wip_finish(port, d);
    }
    command::write_disable(port);

    let sr1 = command::read_sr1(port);
    let updated = (sr1 | BP_MASK) & !(EBL_BIT | SRP_BIT);
    if updated != sr1 {
        command::write_sr1(port, updated);
        status::wait_wip_finish(port, d);
    }
}

/// XMCB status check: after reset, the part should come up with SR1 equal
/// to exactly the QE bit set and nothing else; rewrite it if it doesn't.
fn xmcb_status_check(port: &mut dyn SpiFlashPort, d: &FlashDescriptor) {
    command::reset_enable(port);
    command::reset(port);

    let want = QE_BIT;
    let sr1 = command::read_sr1(port);
    if sr1 != want {
        command::write_sr1(port, want);
        status::wait_wip_finish(port, d);
    }
}
