//! Generic SPI-NOR command primitive.
//!
//! All per-opcode helpers in §4.12/§6 are thin wrappers over [`cmd`]; this
//! is the one place the controller handshake (wait-not-busy, FIFO sizing,
//! readback extraction) is implemented.

use super::port::SpiFlashPort;

bitflags::bitflags! {
    /// Modifiers for [`cmd`].
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    pub struct CommandFlags: u32 {
        /// RX bytes come back in a single readback word rather than the FIFO.
        const RX_READBACK = 1 << 0;
        /// Drive the first TX segment on all four data lines.
        const TX_QUAD = 1 << 1;
        /// Drive the second TX segment (dual-TX commands) on all four lines.
        const TX_QUAD2 = 1 << 2;
    }
}

/// Run one SPI-NOR command: `cmd_word` triggers the transaction after up
/// to two TX segments are staged; `rx_len` bytes come back either via the
/// FIFO or, in readback mode, extracted LSB-first from a single shifted
/// readback word. Mirrors the controller handshake in spec §4.12 exactly.
pub fn cmd(
    port: &mut dyn SpiFlashPort,
    cmd_word: u8,
    tx_segments: &[(&[u8], bool)],
    rx_len: usize,
    flags: CommandFlags,
) -> Vec<u8> {
    port.wait_not_busy();
    port.clear_fifo();
    port.set_rx_size(rx_len);

    let readback = flags.contains(CommandFlags::RX_READBACK);
    port.set_fifo_width(if readback { rx_len.max(1) } else { 1 });

    for (data, quad) in tx_segments {
        port.write_tx_segment(data, *quad);
    }

    port.trigger_command(cmd_word);

    let mut rx = vec![0u8; rx_len];
    if !readback {
        port.read_fifo(&mut rx);
    }

    port.wait_not_busy();

    if readback && rx_len > 0 {
        let word = port.read_readback_word();
        let shift = (4usize.saturating_sub(rx_len)) * 8;
        let shifted = word >> shift;
        for (i, byte) in rx.iter_mut().enumerate() {
            *byte = ((shifted >> (8 * i)) & 0xFF) as u8;
        }
    }

    port.set_rx_size(0);
    rx
}

/// Stage a single, non-quad TX segment, the common case.
pub fn single_tx(data: &[u8]) -> [(&[u8], bool); 1] {
    [(data, false)]
}

/// Big-endian 3-byte address encoding used throughout the protocol.
pub fn addr3(addr: u32) -> [u8; 3] {
    [(addr >> 16) as u8, (addr >> 8) as u8, addr as u8]
}

pub mod opcode {
    pub const RDID: u8 = 0x9F;
    pub const RDSR1: u8 = 0x05;
    pub const RDSR2: u8 = 0x35;
    pub const WRSR: u8 = 0x01;
    pub const WRSR2: u8 = 0x31;
    pub const WREN: u8 = 0x06;
    pub const WRDI: u8 = 0x04;
    pub const VOLATILE_WREN: u8 = 0x50;
    pub const PAGE_PROGRAM: u8 = 0x02;
    pub const ERASE_4K: u8 = 0x20;
    pub const ERASE_32K: u8 = 0x52;
    pub const ERASE_64K: u8 = 0xD8;
    pub const CHIP_ERASE: u8 = 0xC7;
    pub const POWER_DOWN: u8 = 0xB9;
    pub const RELEASE_POWER_DOWN: u8 = 0xAB;
    pub const RESET_ENABLE: u8 = 0x66;
    pub const RESET: u8 = 0x99;
    pub const SUSPEND: u8 = 0x75;
    pub const RESUME: u8 = 0x7A;
    pub const SFDP: u8 = 0x5A;
    pub const RDID_UID: u8 = 0x4B;
    pub const SECURITY_READ: u8 = 0x48;
    pub const SECURITY_PROGRAM: u8 = 0x42;
    pub const SECURITY_ERASE: u8 = 0x44;
    pub const SECURITY_READ_XMCB: u8 = 0x68;
    pub const SECURITY_PROGRAM_XMCB: u8 = 0x62;
    pub const SECURITY_ERASE_XMCB: u8 = 0x64;
}

pub fn read_id(port: &mut dyn SpiFlashPort) -> [u8; 3] {
    let rx = cmd(port, opcode::RDID, &[], 3, CommandFlags::empty());
    [rx[0], rx[1], rx[2]]
}

pub fn write_enable(port: &mut dyn SpiFlashPort) {
    cmd(port, opcode::WREN, &[], 0, CommandFlags::empty());
}

pub fn write_disable(port: &mut dyn SpiFlashPort) {
    cmd(port, opcode::WRDI, &[], 0, CommandFlags::empty());
}

pub fn volatile_write_enable(port: &mut dyn SpiFlashPort) {
    cmd(port, opcode::VOLATILE_WREN, &[], 0, CommandFlags::empty());
}

pub fn read_sr1(port: &mut dyn SpiFlashPort) -> u8 {
    cmd(port, opcode::RDSR1, &[], 1, CommandFlags::empty())[0]
}

pub fn read_sr2(port: &mut dyn SpiFlashPort) -> u8 {
    cmd(port, opcode::RDSR2, &[], 1, CommandFlags::empty())[0]
}

pub fn write_sr1(port: &mut dyn SpiFlashPort, value: u8) {
    write_enable(port);
    cmd(port, opcode::WRSR, &single_tx(&[value]), 0, CommandFlags::empty());
}

pub fn write_sr_wide(port: &mut dyn SpiFlashPort, lo: u8, hi: u8) {
    write_enable(port);
    cmd(
        port,
        opcode::WRSR,
        &single_tx(&[lo, hi]),
        0,
        CommandFlags::empty(),
    );
}

pub fn write_sr2(port: &mut dyn SpiFlashPort, value: u8) {
    write_enable(port);
    cmd(port, opcode::WRSR2, &single_tx(&[value]), 0, CommandFlags::empty());
}

pub fn reset_enable(port: &mut dyn SpiFlashPort) {
    cmd(port, opcode::RESET_ENABLE, &[], 0, CommandFlags::empty());
}

pub fn reset(port: &mut dyn SpiFlashPort) {
    cmd(port, opcode::RESET, &[], 0, CommandFlags::empty());
}

pub fn page_program(port: &mut dyn SpiFlashPort, addr: u32, data: &[u8]) {
    let a = addr3(addr);
    let tx: Vec<u8> = a.iter().copied().chain(data.iter().copied()).collect();
    cmd(port, opcode::PAGE_PROGRAM, &single_tx(&tx), 0, CommandFlags::empty());
}

pub fn erase_4k(port: &mut dyn SpiFlashPort, addr: u32) {
    let a = addr3(addr);
    cmd(port, opcode::ERASE_4K, &single_tx(&a), 0, CommandFlags::empty());
}

pub fn erase_32k(port: &mut dyn SpiFlashPort, addr: u32) {
    let a = addr3(addr);
    cmd(port, opcode::ERASE_32K, &single_tx(&a), 0, CommandFlags::empty());
}

pub fn erase_64k(port: &mut dyn SpiFlashPort, addr: u32) {
    let a = addr3(addr);
    cmd(port, opcode::ERASE_64K, &single_tx(&a), 0, CommandFlags::empty());
}

pub fn chip_erase(port: &mut dyn SpiFlashPort) {
    cmd(port, opcode::CHIP_ERASE, &[], 0, CommandFlags::empty());
}

pub fn power_down(port: &mut dyn SpiFlashPort) {
    cmd(port, opcode::POWER_DOWN, &[], 0, CommandFlags::empty());
}

pub fn release_power_down(port: &mut dyn SpiFlashPort) {
    cmd(port, opcode::RELEASE_POWER_DOWN, &[], 0, CommandFlags::empty());
}

pub fn suspend(port: &mut dyn SpiFlashPort) {
    cmd(port, opcode::SUSPEND, &[], 0, CommandFlags::empty());
}

pub fn resume(port: &mut dyn SpiFlashPort) {
    cmd(port, opcode::RESUME, &[], 0, CommandFlags::empty());
}

/// Read `len` bytes of SFDP data starting at `address`, via a 3-byte
/// address plus one dummy byte, same shape as [`security_read`].
pub fn read_sfdp(port: &mut dyn SpiFlashPort, address: u32, len: usize) -> Vec<u8> {
    let a = addr3(address);
    let tx: Vec<u8> = a.iter().copied().chain(std::iter::once(0u8)).collect();
    cmd(port, opcode::SFDP, &single_tx(&tx), len, CommandFlags::empty())
}

/// Read the 8-byte unique id via the `RDID_UID` opcode (4Bh), with the
/// 4-byte dummy the protocol requires ahead of the id bytes.
pub fn read_uid8(port: &mut dyn SpiFlashPort) -> [u8; 8] {
    let tx = [0u8; 4];
    let rx = cmd(port, opcode::RDID_UID, &single_tx(&tx), 8, CommandFlags::empty());
    rx.try_into().expect("requested exactly 8 bytes")
}

/// As [`read_uid8`], for devices whose unique id is 16 bytes wide.
pub fn read_uid16(port: &mut dyn SpiFlashPort) -> [u8; 16] {
    let tx = [0u8; 4];
    let rx = cmd(port, opcode::RDID_UID, &single_tx(&tx), 16, CommandFlags::empty());
    rx.try_into().expect("requested exactly 16 bytes")
}

/// Read the combined unique-id/customer-product-id block: 16 id bytes
/// followed by a little-endian `u16` CPID at bytes 16-17.
pub fn read_uid_cpid(port: &mut dyn SpiFlashPort) -> ([u8; 16], u16) {
    let tx = [0u8; 4];
    let rx = cmd(port, opcode::RDID_UID, &single_tx(&tx), 18, CommandFlags::empty());
    let mut uid = [0u8; 16];
    uid.copy_from_slice(&rx[..16]);
    let cpid = u16::from_le_bytes([rx[16], rx[17]]);
    (uid, cpid)
}

pub fn security_read(port: &mut dyn SpiFlashPort, xmcb: bool, address: u32, len: usize) -> Vec<u8> {
    let a = addr3(address);
    let tx: Vec<u8> = a.iter().copied().chain(std::iter::once(0u8)).collect();
    let op = if xmcb {
        opcode::SECURITY_READ_XMCB
    } else {
        opcode::SECURITY_READ
    };
    cmd(port, op, &single_tx(&tx), len, CommandFlags::empty())
}

pub fn security_program(port: &mut dyn SpiFlashPort, xmcb: bool, address: u32, data: &[u8]) {
    let a = addr3(address);
    let tx: Vec<u8> = a.iter().copied().chain(data.iter().copied()).collect();
    let op = if xmcb {
        opcode::SECURITY_PROGRAM_XMCB
    } else {
        opcode::SECURITY_PROGRAM
    };
    cmd(port, op, &single_tx(&tx), 0, CommandFlags::empty());
}

pub fn security_erase(port: &mut dyn SpiFlashPort, xmcb: bool, address: u32) {
    let a = addr3(address);
    let op = if xmcb {
        opcode::SECURITY_ERASE_XMCB
    } else {
        opcode::SECURITY_ERASE
    };
    cmd(port, op, &single_tx(&a), 0, CommandFlags::empty());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flash::port::MockPort;

    #[test]
    fn read_id_matches_mock_jedec_id() {
        let mut port = MockPort::new([0xC8, 0x40, 0x17], 8 * 1024 * 1024);
        assert_eq!(read_id(&mut port), [0xC8, 0x40, 0x17]);
    }

    #[test]
    fn write_sr1_then_read_sr1_round_trips() {
        let mut port = MockPort::new([0xC8, 0x40, 0x17], 4096);
        write_sr1(&mut port, 0xAA);
        assert_eq!(read_sr1(&mut port), 0xAA);
    }

    #[test]
    fn page_program_then_erase_round_trip() {
        let mut port = MockPort::new([0xC8, 0x40, 0x17], 8192);
        page_program(&mut port, 0, &[1, 2, 3, 4]);
        assert_eq!(&port.memory[0..4], &[1, 2, 3, 4]);
        erase_4k(&mut port, 0);
        assert!(port.memory[0..4096].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn command_history_records_opcode_and_tx() {
        let mut port = MockPort::new([0xC8, 0x40, 0x17], 4096);
        write_enable(&mut port);
        let last = port.history.last().unwrap();
        assert_eq!(last.opcode, opcode::WREN);
        assert!(last.tx.is_empty());
    }

    #[test]
    fn power_down_and_release_issue_their_opcodes() {
        let mut port = MockPort::new([0xC8, 0x40, 0x17], 4096);
        power_down(&mut port);
        assert_eq!(port.history.last().unwrap().opcode, opcode::POWER_DOWN);
        release_power_down(&mut port);
        assert_eq!(port.history.last().unwrap().opcode, opcode::RELEASE_POWER_DOWN);
    }

    #[test]
    fn suspend_and_resume_issue_their_opcodes() {
        let mut port = MockPort::new([0xC8, 0x40, 0x17], 4096);
        suspend(&mut port);
        assert_eq!(port.history.last().unwrap().opcode, opcode::SUSPEND);
        resume(&mut port);
        assert_eq!(port.history.last().unwrap().opcode, opcode::RESUME);
    }

    #[test]
    fn read_sfdp_returns_backing_bytes_at_address() {
        let mut port = MockPort::new([0xC8, 0x40, 0x17], 4096);
        port.sfdp = vec![0x53, 0x46, 0x44, 0x50, 0x00, 0x06];
        assert_eq!(read_sfdp(&mut port, 0, 4), &[0x53, 0x46, 0x44, 0x50]);
        assert_eq!(read_sfdp(&mut port, 4, 2), &[0x00, 0x06]);
    }

    #[test]
    fn read_uid8_and_uid16_return_the_configured_id() {
        let mut port = MockPort::new([0xC8, 0x40, 0x17], 4096);
        port.uid = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16];
        assert_eq!(read_uid8(&mut port), [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(
            read_uid16(&mut port),
            [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16]
        );
    }

    #[test]
    fn read_uid_cpid_splits_id_and_trailing_little_endian_cpid() {
        let mut port = MockPort::new([0xC8, 0x40, 0x17], 4096);
        port.uid = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16];
        port.cpid = 0xBEEF;
        let (uid, cpid) = read_uid_cpid(&mut port);
        assert_eq!(uid, [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16]);
        assert_eq!(cpid, 0xBEEF);
    }
}
