//! Memory-mapped NIC descriptor-ring driver
//!
//! Models the NIC as a memory-mapped register file plus two descriptor
//! rings: a hardware-written RX ring and a software-written TX ring, with
//! `{base, len, head, tail}` control registers per ring. No interrupts,
//! no syscalls on the data path - the receive side is a poll loop reading
//! descriptor memory directly.
//!
//! Poll contract (RX):
//! 1. Read the hardware head register. Equal to the software head -> empty.
//! 2. Inspect the descriptor at the software head. DONE bit clear -> empty.
//! 3. Hand the frame bytes to the caller, clear DONE, advance the software
//!    head (mod ring size) and write it back to the hardware tail register.
//!
//! Submission mirrors it: copy the payload into the TX slot, write the
//! descriptor `(addr, len | EOP)`, advance the software tail, kick the
//! tail register behind a release fence. Register accesses go through
//! volatile loads/stores; they are ordered MMIO as far as this driver is
//! concerned.
//!
//! The register file is backed either by an `mmap` of a PCI resource file
//! (`NicDriver::map`) or by driver-owned memory (`NicDriver::mock`) so the
//! protocol is exercisable without hardware; `inject_rx` plays the
//! hardware side in that mode. All rings and packet buffers are owned by
//! the driver and released on drop, maps last.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::atomic::{fence, Ordering};

use anyhow::{Context, Result};
use memmap2::MmapMut;

/// RX descriptor ring size (power of two)
pub const RX_RING_SIZE: usize = 512;
/// TX descriptor ring size (power of two)
pub const TX_RING_SIZE: usize = 512;
/// Per-slot packet buffer size
pub const PACKET_BUF_SIZE: usize = 2048;

/// Descriptor-done bit: hardware sets it on RX completion, software
/// clears it when the frame has been consumed.
pub const DESC_DONE: u32 = 1;
/// End-of-packet flag in the TX descriptor command word
pub const TX_EOP: u64 = 1 << 24;

/// Register offsets into the BAR0 register file
pub mod reg {
    pub const RX_BASE: usize = 0x2800;
    pub const RX_LEN: usize = 0x2808;
    /// Written by hardware as frames arrive
    pub const RX_HEAD: usize = 0x2810;
    /// Written by software to return consumed slots
    pub const RX_TAIL: usize = 0x2818;

    pub const TX_BASE: usize = 0x6000;
    pub const TX_LEN: usize = 0x6008;
    /// Written by hardware as frames drain
    pub const TX_HEAD: usize = 0x6010;
    /// Written by software to publish new frames
    pub const TX_TAIL: usize = 0x6018;
}

/// Size of the mapped register window
const BAR0_SIZE: usize = 0x8000;

/// RX descriptor: hardware fills `pkt_len` and sets [`DESC_DONE`] in
/// `status` when the frame has been DMA'd into the buffer.
#[derive(Debug, Clone, Copy, Default)]
#[repr(C, align(16))]
pub struct RxDescriptor {
    pub buf_addr: u64,
    pub pkt_len: u32,
    pub status: u32,
}

/// TX descriptor: software writes `(addr, len | EOP)`, hardware DMAs the
/// frame out and advances its head.
#[derive(Debug, Clone, Copy, Default)]
#[repr(C, align(16))]
pub struct TxDescriptor {
    pub buf_addr: u64,
    pub cmd_len: u64,
}

/// Backing storage for the register window
enum Bar0 {
    /// Real device resource mapping
    Mapped(MmapMut),
    /// Driver-owned memory standing in for the device
    Mock(Box<[u8]>),
}

impl Bar0 {
    #[inline(always)]
    fn ptr(&self) -> *const u8 {
        match self {
            Bar0::Mapped(m) => m.as_ptr(),
            Bar0::Mock(b) => b.as_ptr(),
        }
    }

    #[inline(always)]
    fn ptr_mut(&mut self) -> *mut u8 {
        match self {
            Bar0::Mapped(m) => m.as_mut_ptr(),
            Bar0::Mock(b) => b.as_mut_ptr(),
        }
    }
}

/// Driver statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct NicStats {
    pub frames_received: u64,
    pub bytes_received: u64,
    pub frames_sent: u64,
    pub bytes_sent: u64,
}

/// Poll-mode NIC driver owning its rings and packet buffers.
///
/// Field order matters for drop: descriptors and buffers are released
/// before the register mapping is unmapped.
pub struct NicDriver {
    rx_ring: Vec<RxDescriptor>,
    tx_ring: Vec<TxDescriptor>,
    rx_buffers: Vec<Box<[u8]>>,
    tx_buffers: Vec<Box<[u8]>>,
    /// Software RX head (consumer index)
    rx_head: usize,
    /// Software TX tail (producer index)
    tx_tail: usize,
    stats: NicStats,
    bar0: Bar0,
}

impl NicDriver {
    /// Map a PCI resource file (e.g.
    /// `/sys/bus/pci/devices/<bdf>/resource0`) as the register window.
    pub fn map<P: AsRef<Path>>(pci_resource: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(pci_resource.as_ref())
            .with_context(|| {
                format!("open PCI resource {}", pci_resource.as_ref().display())
            })?;

        let mmap = unsafe { MmapMut::map_mut(&file) }
            .with_context(|| "map BAR0 register window")?;
        anyhow::ensure!(
            mmap.len() >= BAR0_SIZE,
            "BAR0 window too small: {} bytes",
            mmap.len()
        );

        tracing::info!(
            "mapped NIC register window: {} ({} bytes)",
            pci_resource.as_ref().display(),
            mmap.len()
        );

        Ok(Self::with_bar0(Bar0::Mapped(mmap)))
    }

    /// Driver with an owned register file standing in for the device.
    /// Tests and the simulator feeder drive the hardware side via
    /// [`inject_rx`](Self::inject_rx) / [`drain_tx`](Self::drain_tx).
    pub fn mock() -> Self {
        Self::with_bar0(Bar0::Mock(vec![0u8; BAR0_SIZE].into_boxed_slice()))
    }

    fn with_bar0(bar0: Bar0) -> Self {
        let rx_buffers: Vec<Box<[u8]>> = (0..RX_RING_SIZE)
            .map(|_| vec![0u8; PACKET_BUF_SIZE].into_boxed_slice())
            .collect();
        let tx_buffers: Vec<Box<[u8]>> = (0..TX_RING_SIZE)
            .map(|_| vec![0u8; PACKET_BUF_SIZE].into_boxed_slice())
            .collect();

        let rx_ring: Vec<RxDescriptor> = rx_buffers
            .iter()
            .map(|buf| RxDescriptor {
                buf_addr: buf.as_ptr() as u64,
                pkt_len: 0,
                status: 0,
            })
            .collect();
        let tx_ring = vec![TxDescriptor::default(); TX_RING_SIZE];

        let mut driver = Self {
            rx_ring,
            tx_ring,
            rx_buffers,
            tx_buffers,
            rx_head: 0,
            tx_tail: 0,
            stats: NicStats::default(),
            bar0,
        };

        // Program ring geometry into the device registers
        driver.write_reg64(reg::RX_BASE, driver.rx_ring.as_ptr() as u64);
        driver.write_reg32(reg::RX_LEN, RX_RING_SIZE as u32);
        driver.write_reg64(reg::TX_BASE, driver.tx_ring.as_ptr() as u64);
        driver.write_reg32(reg::TX_LEN, TX_RING_SIZE as u32);
        driver.write_reg32(reg::RX_HEAD, 0);
        driver.write_reg32(reg::RX_TAIL, 0);
        driver.write_reg32(reg::TX_HEAD, 0);
        driver.write_reg32(reg::TX_TAIL, 0);

        driver
    }

    // ===== register access (ordered MMIO) =====

    #[inline(always)]
    fn read_reg32(&self, offset: usize) -> u32 {
        debug_assert!(offset + 4 <= BAR0_SIZE);
        unsafe { (self.bar0.ptr().add(offset) as *const u32).read_volatile() }
    }

    #[inline(always)]
    fn write_reg32(&mut self, offset: usize, value: u32) {
        debug_assert!(offset + 4 <= BAR0_SIZE);
        unsafe { (self.bar0.ptr_mut().add(offset) as *mut u32).write_volatile(value) }
    }

    #[inline(always)]
    fn write_reg64(&mut self, offset: usize, value: u64) {
        debug_assert!(offset + 8 <= BAR0_SIZE);
        unsafe { (self.bar0.ptr_mut().add(offset) as *mut u64).write_volatile(value) }
    }

    // ===== RX poll path =====

    /// Poll for one received frame. Returns the frame bytes, or `None`
    /// when no frame is pending. Never blocks.
    #[inline]
    pub fn poll_rx(&mut self) -> Option<&[u8]> {
        // 1. Hardware head: where the device last wrote
        let hw_head = self.read_reg32(reg::RX_HEAD) as usize;
        if hw_head == self.rx_head {
            return None;
        }

        // 2. DONE bit must be set before the frame bytes are readable
        let idx = self.rx_head;
        if self.rx_ring[idx].status & DESC_DONE == 0 {
            return None;
        }
        let len = (self.rx_ring[idx].pkt_len as usize).min(PACKET_BUF_SIZE);

        // 3. Consume: clear DONE, advance, return the slot to hardware
        self.rx_ring[idx].status = 0;
        self.rx_ring[idx].pkt_len = 0;
        self.rx_head = (self.rx_head + 1) & (RX_RING_SIZE - 1);
        let new_head = self.rx_head as u32;
        self.write_reg32(reg::RX_TAIL, new_head);

        self.stats.frames_received += 1;
        self.stats.bytes_received += len as u64;

        Some(&self.rx_buffers[idx][..len])
    }

    // ===== TX submit path =====

    /// Submit one frame for transmission. Returns `false` when the TX
    /// ring is full (frame dropped by the caller).
    pub fn submit_tx(&mut self, payload: &[u8]) -> bool {
        if payload.len() > PACKET_BUF_SIZE {
            return false;
        }

        let next = (self.tx_tail + 1) & (TX_RING_SIZE - 1);
        let hw_head = self.read_reg32(reg::TX_HEAD) as usize;
        if next == hw_head {
            return false; // ring full
        }

        let idx = self.tx_tail;
        self.tx_buffers[idx][..payload.len()].copy_from_slice(payload);
        self.tx_ring[idx] = TxDescriptor {
            buf_addr: self.tx_buffers[idx].as_ptr() as u64,
            cmd_len: payload.len() as u64 | TX_EOP,
        };

        self.tx_tail = next;

        // Descriptor and payload writes must be visible before the kick
        fence(Ordering::Release);
        let tail = self.tx_tail as u32;
        self.write_reg32(reg::TX_TAIL, tail);

        self.stats.frames_sent += 1;
        self.stats.bytes_sent += payload.len() as u64;
        true
    }

    /// Driver counters
    pub fn stats(&self) -> NicStats {
        self.stats
    }

    // ===== hardware side (mock mode) =====

    /// Play the hardware role: DMA a frame into the next RX slot, mark
    /// it DONE and advance the hardware head register. Returns `false`
    /// when the RX ring is full.
    pub fn inject_rx(&mut self, frame: &[u8]) -> bool {
        if frame.len() > PACKET_BUF_SIZE {
            return false;
        }

        let hw_head = self.read_reg32(reg::RX_HEAD) as usize;
        let next = (hw_head + 1) & (RX_RING_SIZE - 1);
        if next == self.rx_head {
            return false; // no free slot
        }

        self.rx_buffers[hw_head][..frame.len()].copy_from_slice(frame);
        self.rx_ring[hw_head].pkt_len = frame.len() as u32;
        self.rx_ring[hw_head].status = DESC_DONE;
        self.write_reg32(reg::RX_HEAD, next as u32);
        true
    }

    /// Play the hardware role on TX: drain one published frame, advance
    /// the hardware head register and return the frame bytes.
    pub fn drain_tx(&mut self) -> Option<Vec<u8>> {
        let hw_head = self.read_reg32(reg::TX_HEAD) as usize;
        let sw_tail = self.read_reg32(reg::TX_TAIL) as usize;
        if hw_head == sw_tail {
            return None;
        }

        let desc = self.tx_ring[hw_head];
        let len = (desc.cmd_len & !TX_EOP) as usize;
        let frame = self.tx_buffers[hw_head][..len.min(PACKET_BUF_SIZE)].to_vec();
        self.write_reg32(reg::TX_HEAD, ((hw_head + 1) & (TX_RING_SIZE - 1)) as u32);
        Some(frame)
    }
}

impl Drop for NicDriver {
    fn drop(&mut self) {
        // Quiesce the device before the rings are freed and the register
        // window is unmapped (mapping drops last by field order).
        self.write_reg64(reg::RX_BASE, 0);
        self.write_reg32(reg::RX_LEN, 0);
        self.write_reg64(reg::TX_BASE, 0);
        self.write_reg32(reg::TX_LEN, 0);
        tracing::debug!(
            "nic driver released: rx_frames={} tx_frames={}",
            self.stats.frames_received,
            self.stats.frames_sent
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_poll_returns_none() {
        let mut nic = NicDriver::mock();
        assert!(nic.poll_rx().is_none());
    }

    #[test]
    fn test_rx_roundtrip() {
        let mut nic = NicDriver::mock();

        assert!(nic.inject_rx(b"frame-one"));
        assert!(nic.inject_rx(b"frame-two"));

        assert_eq!(nic.poll_rx().unwrap(), b"frame-one");
        assert_eq!(nic.poll_rx().unwrap(), b"frame-two");
        assert!(nic.poll_rx().is_none());

        let stats = nic.stats();
        assert_eq!(stats.frames_received, 2);
        assert_eq!(stats.bytes_received, 18);
    }

    #[test]
    fn test_rx_returns_slot_to_hardware() {
        let mut nic = NicDriver::mock();

        nic.inject_rx(b"x");
        nic.poll_rx().unwrap();

        // Software head was written back to the RX tail register
        assert_eq!(nic.read_reg32(reg::RX_TAIL), 1);
    }

    #[test]
    fn test_rx_ring_wraps() {
        let mut nic = NicDriver::mock();

        for round in 0..(RX_RING_SIZE * 2 + 3) {
            let payload = [round as u8; 4];
            assert!(nic.inject_rx(&payload));
            assert_eq!(nic.poll_rx().unwrap(), &payload);
        }
    }

    #[test]
    fn test_rx_ring_full_rejects_injection() {
        let mut nic = NicDriver::mock();

        // One slot stays reserved
        for i in 0..RX_RING_SIZE - 1 {
            assert!(nic.inject_rx(&[i as u8]), "slot {} should accept", i);
        }
        assert!(!nic.inject_rx(b"overflow"));
    }

    #[test]
    fn test_tx_submit_and_drain() {
        let mut nic = NicDriver::mock();

        assert!(nic.submit_tx(b"order-frame"));
        assert_eq!(nic.read_reg32(reg::TX_TAIL), 1);

        let frame = nic.drain_tx().unwrap();
        assert_eq!(frame, b"order-frame");
        assert!(nic.drain_tx().is_none());
        assert_eq!(nic.stats().frames_sent, 1);
    }

    #[test]
    fn test_tx_descriptor_carries_eop() {
        let mut nic = NicDriver::mock();
        nic.submit_tx(b"abc");

        let desc = nic.tx_ring[0];
        assert_eq!(desc.cmd_len & TX_EOP, TX_EOP);
        assert_eq!(desc.cmd_len & !TX_EOP, 3);
    }

    #[test]
    fn test_oversized_frames_rejected() {
        let mut nic = NicDriver::mock();
        let big = vec![0u8; PACKET_BUF_SIZE + 1];
        assert!(!nic.inject_rx(&big));
        assert!(!nic.submit_tx(&big));
    }

    #[test]
    fn test_decoded_frame_through_nic() {
        use crate::ingress::decode::{self, msg_type, update_kind, Message};
        use zerocopy::AsBytes;

        let msg = crate::ingress::decode::BookUpdateMsg {
            header: crate::ingress::decode::MsgHeader {
                sequence: 11,
                msg_type: msg_type::BOOK_UPDATE,
                msg_len: std::mem::size_of::<crate::ingress::decode::BookUpdateMsg>() as u16,
                timestamp_ns: 5_000,
            },
            order_id: 1,
            symbol_id: 1,
            side: 0,
            kind: update_kind::ADD,
            _pad: 0,
            price: 100.0,
            quantity: 5.0,
        };

        let mut nic = NicDriver::mock();
        nic.inject_rx(msg.as_bytes());

        let frame = nic.poll_rx().unwrap();
        match decode::decode(frame).unwrap() {
            Message::BookUpdate(m) => assert_eq!(m.order_id(), 1),
            _ => panic!("expected book update"),
        }
    }
}
