//! The hardware seam: FIFO/command-register access abstracted as a trait.
//!
//! Generalizes `hw::Register<T>`'s type-safe wrapper over a raw MMIO
//! address one level further: rather than a single register,
//! `SpiFlashPort` is the whole FIFO/command-trigger surface the command
//! core drives. Production ports implement it against real registers;
//! [`MockPort`] implements it against an in-memory model for tests,
//! recording every opcode issued.

/// The controller-level operations [`crate::flash::command::cmd`] drives.
/// A real implementation talks to hardware FIFO/command registers; this
/// is the `SpiFlashPort` abstraction the design notes call for in place
/// of a raw register-block pointer.
pub trait SpiFlashPort: Send {
    /// Busy-wait until the controller reports it is not mid-transaction.
    fn wait_not_busy(&mut self);
    /// Reset the TX/RX FIFOs.
    fn clear_fifo(&mut self);
    /// Program how many bytes the next transaction should receive.
    fn set_rx_size(&mut self, len: usize);
    /// Program the FIFO data width in bytes (1 normally, `rx_len` in
    /// readback mode).
    fn set_fifo_width(&mut self, width: usize);
    /// Push one TX segment into the FIFO, `quad` selecting single vs.
    /// quad-line drive for that segment.
    fn write_tx_segment(&mut self, data: &[u8], quad: bool);
    /// Write the command register, triggering the hardware transaction.
    fn trigger_command(&mut self, opcode: u8);
    /// Drain `buf.len()` bytes from the RX FIFO (non-readback mode).
    fn read_fifo(&mut self, buf: &mut [u8]);
    /// Read the single readback word (readback mode).
    fn read_readback_word(&mut self) -> u32;
}

/// A recorded transaction, for test assertions against the exact
/// opcode/TX/RX sequence in spec §6.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedCommand {
    pub opcode: u8,
    pub tx: Vec<u8>,
    pub rx_len: usize,
}

/// An in-memory stand-in for a SPI-NOR chip, implementing just enough
/// state (status registers, a flat byte array, JEDEC ID) to exercise the
/// command core and the layers above it without real hardware.
pub struct MockPort {
    pub jedec_id: [u8; 3],
    pub sr1: u8,
    pub sr2: u8,
    pub memory: Vec<u8>,
    pub security: std::collections::HashMap<u32, Vec<u8>>,
    pub history: Vec<RecordedCommand>,
    /// Fixed unique-id bytes the mock returns for 4Bh reads; the leading
    /// `N` of these are used depending on how many bytes the caller asked
    /// for (8, 16, or 16 + a little-endian CPID appended at the end).
    pub uid: [u8; 16],
    pub cpid: u16,
    /// Backing bytes for simulated SFDP (5Ah) reads.
    pub sfdp: Vec<u8>,
    rx_size: usize,
    fifo_width: usize,
    pending_tx: Vec<u8>,
    rx_scratch: Vec<u8>,
    readback_word: u32,
}

impl MockPort {
    pub fn new(jedec_id: [u8; 3], memory_size: usize) -> Self {
        Self {
            jedec_id,
            sr1: 0,
            sr2: 0,
            memory: vec![0xFFu8; memory_size],
            security: std::collections::HashMap::new(),
            history: Vec::new(),
            uid: [0u8; 16],
            cpid: 0,
            sfdp: Vec::new(),
            rx_size: 0,
            fifo_width: 1,
            pending_tx: Vec::new(),
            rx_scratch: Vec::new(),
            readback_word: 0,
        }
    }

    fn addr3(tx: &[u8]) -> usize {
        ((tx[0] as usize) << 16) | ((tx[1] as usize) << 8) | tx[2] as usize
    }
}

impl SpiFlashPort for MockPort {
    fn wait_not_busy(&mut self) {}

    fn clear_fifo(&mut self) {
        self.pending_tx.clear();
        self.rx_scratch.clear();
    }

    fn set_rx_size(&mut self, len: usize) {
        self.rx_size = len;
    }

    fn set_fifo_width(&mut self, width: usize) {
        self.fifo_width = width;
    }

    fn write_tx_segment(&mut self, data: &[u8], _quad: bool) {
        self.pending_tx.extend_from_slice(data);
    }

    fn trigger_command(&mut self, opcode: u8) {
        self.history.push(RecordedCommand {
            opcode,
            tx: self.pending_tx.clone(),
            rx_len: self.rx_size,
        });

        let tx = self.pending_tx.clone();
        self.rx_scratch = vec![0u8; self.rx_size];
        self.readback_word = 0;

        match opcode {
            0x9F => {
                self.rx_scratch[..3.min(self.rx_size)]
                    .copy_from_slice(&self.jedec_id[..3.min(self.rx_size)]);
            }
            0x05 => {
                if self.rx_size > 0 {
                    self.rx_scratch[0] = self.sr1;
                }
                self.readback_word = (self.sr1 as u32) << ((4usize.saturating_sub(self.rx_size)) * 8);
            }
            0x35 => {
                if self.rx_size > 0 {
                    self.rx_scratch[0] = self.sr2;
                }
                self.readback_word = (self.sr2 as u32) << ((4usize.saturating_sub(self.rx_size)) * 8);
            }
            0x01 => {
                if !tx.is_empty() {
                    self.sr1 = tx[0];
                }
                if tx.len() > 1 {
                    self.sr2 = tx[1];
                }
            }
            0x31 => {
                if !tx.is_empty() {
                    self.sr2 = tx[0];
                }
            }
            0x02 => {
                let addr = Self::addr3(&tx);
                let data = &tx[3..];
                self.memory[addr..addr + data.len()].copy_from_slice(data);
            }
            0x20 => {
                let addr = Self::addr3(&tx);
                self.memory[addr..addr + 4096].fill(0xFF);
            }
            0x52 => {
                let addr = Self::addr3(&tx);
                self.memory[addr..addr + 32 * 1024].fill(0xFF);
            }
            0xD8 => {
                let addr = Self::addr3(&tx);
                self.memory[addr..addr + 64 * 1024].fill(0xFF);
            }
            0xC7 => self.memory.fill(0xFF),
            0x99 => {
                // RESET: clears WIP/WEL/suspend state, the way a real
                // part's software reset does.
                self.sr1 &= !0b1000_0011; // WIP (bit 0), WEL (bit 1), SUS1 (bit 7)
                self.sr2 &= !0b1000_0000; // SUS2 (bit 7)
            }
            0x48 | 0x68 => {
                let addr = Self::addr3(&tx) as u32;
                let data = self
                    .security
                    .get(&addr)
                    .cloned()
                    .unwrap_or_else(|| vec![0xFF; self.rx_size]);
                let n = data.len().min(self.rx_size);
                self.rx_scratch[..n].copy_from_slice(&data[..n]);
            }
            0x42 | 0x62 => {
                let addr = Self::addr3(&tx) as u32;
                let data = tx[3..].to_vec();
                self.security.insert(addr, data);
            }
            0x44 | 0x64 => {
                let addr = Self::addr3(&tx) as u32 & !0xFFFu32;
                self.security.insert(addr, vec![0xFF; 4096]);
            }
            0x4B => {
                // RDID_UID: 3-byte address + 1 dummy precede the id bytes,
                // but the mock doesn't distinguish a real address, it just
                // returns its fixed `uid`/`cpid` sized to whatever the
                // caller requested (8, 16, or 18 bytes).
                let mut out = self.uid.to_vec();
                if self.rx_size == 18 {
                    out.extend_from_slice(&self.cpid.to_le_bytes());
                }
                let n = out.len().min(self.rx_size);
                self.rx_scratch[..n].copy_from_slice(&out[..n]);
            }
            0x5A => {
                let addr = Self::addr3(&tx);
                let n = self.rx_size.min(self.sfdp.len().saturating_sub(addr));
                if n > 0 {
                    self.rx_scratch[..n].copy_from_slice(&self.sfdp[addr..addr + n]);
                }
            }
            _ => {}
        }
    }

    fn read_fifo(&mut self, buf: &mut [u8]) {
        let n = buf.len().min(self.rx_scratch.len());
        buf[..n].copy_from_slice(&self.rx_scratch[..n]);
    }

    fn read_readback_word(&mut self) -> u32 {
        self.readback_word
    }
}
