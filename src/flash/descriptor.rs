//! JEDEC-ID-keyed device property table.
//!
//! Per the design notes (§9), the original's packed bit-field struct for
//! device family/write-protect style/flags is represented here as sum
//! types (`FlashType`, `WpType`, `UidType`) plus a `bitflags!` set instead.

/// Status-check / security-register family, see §4.16/§4.17.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FlashType {
    Gd,
    Winbond,
    Xmcc,
    Xtx,
    Puya,
    Xmca,
    Xmcb,
}

impl FlashType {
    /// `true` for the one family whose security-register opcodes differ
    /// (68/62/64h instead of 48/42/44h), see §4.16.
    pub fn uses_alt_security_opcodes(self) -> bool {
        matches!(self, FlashType::Xmcb)
    }
}

/// Which write-protect table applies, if any.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum WpType {
    Gd,
    Xmca,
    None,
}

/// Which unique-ID opcode variant the device supports.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum UidType {
    Uid8,
    Uid16,
    SfdpFallback,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CpidType {
    Standard,
    None,
}

bitflags::bitflags! {
    /// Device capability flags, keyed off the property table.
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    pub struct DeviceFlags: u32 {
        const VOLATILE_SR_EN = 1 << 0;
        const SUSPEND_EN     = 1 << 1;
        const SFDP_EN        = 1 << 2;
        const WRITE_SR12     = 1 << 3;
        const HAS_SR2        = 1 << 4;
        const HAS_SUS1       = 1 << 5;
        const HAS_SUS2       = 1 << 6;
    }
}

/// A bound device descriptor, populated by [`crate::flash::init::init`]
/// from the property table below.
#[derive(Clone, Copy, Debug)]
pub struct FlashDescriptor {
    pub mid: u32,
    pub capacity: usize,
    pub sreg_block_size: usize,
    pub flash_type: FlashType,
    pub wp_type: WpType,
    pub uid_type: UidType,
    pub cpid_type: CpidType,
    pub sreg_min_num: u8,
    pub sreg_max_num: u8,
    pub flags: DeviceFlags,
}

/// One property-table row. `mid` is the canonical 24-bit JEDEC id; lookup
/// falls back to progressively coarser masks of it (§4.17).
struct PropertyRow {
    mid: u32,
    template: FlashDescriptor,
}

macro_rules! row {
    ($mid:expr, $type:expr, $wp:expr, $uid:expr, $cpid:expr, $block:expr, $min:expr, $max:expr, $flags:expr) => {
        PropertyRow {
            mid: $mid,
            template: FlashDescriptor {
                mid: $mid,
                capacity: 0,
                sreg_block_size: $block,
                flash_type: $type,
                wp_type: $wp,
                uid_type: $uid,
                cpid_type: $cpid,
                sreg_min_num: $min,
                sreg_max_num: $max,
                flags: $flags,
            },
        }
    };
}

static PROPERTIES: &[PropertyRow] = &[
    // GigaDevice (mfg 0xC8), 8 MiB part.
    row!(
        0xC8_40_17,
        FlashType::Gd,
        WpType::Gd,
        UidType::Uid16,
        CpidType::Standard,
        256,
        1,
        4,
        DeviceFlags::VOLATILE_SR_EN
            .union(DeviceFlags::SUSPEND_EN)
            .union(DeviceFlags::HAS_SR2)
            .union(DeviceFlags::HAS_SUS1)
    ),
    // Winbond (mfg 0xEF): same status-check family as GD, no WP table.
    row!(
        0xEF_40_17,
        FlashType::Winbond,
        WpType::None,
        UidType::Uid8,
        CpidType::Standard,
        256,
        1,
        3,
        DeviceFlags::SUSPEND_EN.union(DeviceFlags::HAS_SR2)
    ),
    // XMCC (mfg 0x20).
    row!(
        0x20_40_16,
        FlashType::Xmcc,
        WpType::None,
        UidType::Uid8,
        CpidType::None,
        256,
        1,
        2,
        DeviceFlags::HAS_SR2
    ),
    // XTX (mfg 0x0B).
    row!(
        0x0B_40_16,
        FlashType::Xtx,
        WpType::None,
        UidType::Uid8,
        CpidType::None,
        256,
        1,
        2,
        DeviceFlags::HAS_SR2
    ),
    // Puya (mfg 0x85).
    row!(
        0x85_60_15,
        FlashType::Puya,
        WpType::None,
        UidType::Uid8,
        CpidType::None,
        256,
        1,
        2,
        DeviceFlags::HAS_SR2
    ),
    // XMCA (mfg 0x1C): 8-bit SR1 only, OTP-mode status-check family.
    row!(
        0x1C_40_16,
        FlashType::Xmca,
        WpType::Xmca,
        UidType::Uid8,
        CpidType::None,
        256,
        1,
        2,
        DeviceFlags::SFDP_EN
    ),
    // XMCB (mfg 0x1D): alternate security-register opcodes.
    row!(
        0x1D_40_16,
        FlashType::Xmcb,
        WpType::None,
        UidType::Uid8,
        CpidType::None,
        256,
        1,
        4,
        DeviceFlags::empty()
    ),
];

/// Bind a descriptor from an observed 3-byte JEDEC id, per §4.17's
/// three-tier match (exact, then 16-bit mfg+memtype, then 8-bit mfg).
/// Returns `None` if no vendor byte is recognised at all.
pub fn lookup(id: [u8; 3]) -> Option<FlashDescriptor> {
    let observed = ((id[0] as u32) << 16) | ((id[1] as u32) << 8) | id[2] as u32;

    let exact = PROPERTIES.iter().find(|row| row.mid == observed);
    let row = exact.or_else(|| {
        PROPERTIES
            .iter()
            .find(|row| (row.mid >> 8) == (observed >> 8))
    });
    let row = row.or_else(|| {
        PROPERTIES
            .iter()
            .find(|row| (row.mid >> 16) == (observed >> 16))
    });

    row.map(|row| {
        let mut d = row.template;
        d.capacity = 1usize << (observed & 0xFF);
        d.mid = observed;
        d
    })
}
