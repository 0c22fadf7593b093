//! Per-user logical-channel state: DL queue mirrors, UL buffer-status
//! bookkeeping and the pending control-element FIFO.

use std::collections::VecDeque;

use enb_core::{Lcid, MAX_LCG, MAX_LCID};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LchDirection {
    Dl,
    Ul,
    Both,
}

#[derive(Debug, Clone, Copy)]
pub struct LchConfig {
    pub direction: LchDirection,
    pub lcg: u8,
    /// Lower value schedules first
    pub priority: u8,
    /// Prioritised bit rate, bytes per ms; 0 disables the bucket
    pub pbr_bytes_per_ms: u32,
}

impl LchConfig {
    pub fn srb(priority: u8) -> LchConfig {
        LchConfig { direction: LchDirection::Both, lcg: 0, priority, pbr_bytes_per_ms: 0 }
    }
}

#[derive(Debug, Clone)]
struct LchState {
    cfg: LchConfig,
    buf_tx: u32,
    buf_retx: u32,
    bucket: u32,
}

/// Pending downlink control elements, emitted before SDUs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingCe {
    /// 6-bit timing-advance command
    TaCmd(u8),
    /// 48-bit contention-resolution identity
    ConRes([u8; 6]),
    /// SCell activation bitmap
    ScellAct(u8),
}

impl PendingCe {
    /// Subheader plus payload bytes inside a MAC PDU
    pub fn pdu_bytes(&self) -> u32 {
        match self {
            PendingCe::TaCmd(_) | PendingCe::ScellAct(_) => 2,
            PendingCe::ConRes(_) => 7,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct LchManager {
    channels: Vec<Option<LchState>>,
    lcg_bsr: [u32; MAX_LCG],
    pending_ces: VecDeque<PendingCe>,
}

impl LchManager {
    pub fn new() -> LchManager {
        LchManager { channels: vec![None; MAX_LCID], lcg_bsr: [0; MAX_LCG], pending_ces: VecDeque::new() }
    }

    pub fn set_cfg(&mut self, lcid: Lcid, cfg: LchConfig) {
        if (lcid as usize) < MAX_LCID {
            self.channels[lcid as usize] =
                Some(LchState { cfg, buf_tx: 0, buf_retx: 0, bucket: 0 });
        } else {
            tracing::error!("set_cfg: invalid lcid={}", lcid);
        }
    }

    pub fn rem(&mut self, lcid: Lcid) {
        if (lcid as usize) < MAX_LCID {
            self.channels[lcid as usize] = None;
        }
    }

    pub fn is_configured(&self, lcid: Lcid) -> bool {
        (lcid as usize) < MAX_LCID && self.channels[lcid as usize].is_some()
    }

    pub fn lcg_of(&self, lcid: Lcid) -> Option<u8> {
        self.channels.get(lcid as usize)?.as_ref().map(|c| c.cfg.lcg)
    }

    /// Replace the DL queue counters reported by RLC
    pub fn dl_buffer(&mut self, lcid: Lcid, tx_queue: u32, retx_queue: u32) {
        match self.channels.get_mut(lcid as usize).and_then(|c| c.as_mut()) {
            Some(ch) => {
                ch.buf_tx = tx_queue;
                ch.buf_retx = retx_queue;
            }
            None => tracing::warn!("dl_buffer for unconfigured lcid={}", lcid),
        }
    }

    /// Replace the reported BSR of one logical-channel group
    pub fn ul_bsr(&mut self, lcg: u8, bytes: u32) {
        if (lcg as usize) < MAX_LCG {
            self.lcg_bsr[lcg as usize] = bytes;
        } else {
            tracing::warn!("ul_bsr for invalid lcg={}", lcg);
        }
    }

    /// Additive update, used by the synthesised BSR path
    pub fn ul_buffer_add(&mut self, lcid: Lcid, bytes: u32) {
        let lcg = self.lcg_of(lcid).unwrap_or(0);
        self.lcg_bsr[lcg as usize] = self.lcg_bsr[lcg as usize].saturating_add(bytes);
    }

    pub fn ul_pending_bytes(&self) -> u32 {
        self.lcg_bsr.iter().sum()
    }

    pub fn dl_pending_bytes(&self) -> u32 {
        self.channels
            .iter()
            .flatten()
            .filter(|c| c.cfg.direction != LchDirection::Ul)
            .map(|c| c.buf_tx + c.buf_retx)
            .sum()
    }

    pub fn dl_pending_bytes_lcid(&self, lcid: Lcid) -> u32 {
        self.channels
            .get(lcid as usize)
            .and_then(|c| c.as_ref())
            .map_or(0, |c| c.buf_tx + c.buf_retx)
    }

    /// DL channels with data, most urgent first (retransmission queues
    /// ahead of fresh data, then by configured priority, then LCID)
    pub fn prioritized_dl_lcids(&self) -> Vec<Lcid> {
        let mut with_data: Vec<(bool, u8, Lcid)> = self
            .channels
            .iter()
            .enumerate()
            .filter_map(|(lcid, c)| c.as_ref().map(|c| (lcid as Lcid, c)))
            .filter(|(_, c)| c.cfg.direction != LchDirection::Ul && c.buf_tx + c.buf_retx > 0)
            .map(|(lcid, c)| (c.buf_retx == 0, c.cfg.priority, lcid))
            .collect();
        with_data.sort_unstable();
        with_data.into_iter().map(|(_, _, lcid)| lcid).collect()
    }

    /// Subtract bytes just scheduled for transmission; the next RLC buffer
    /// report replaces these counters anyway.
    pub fn dl_scheduled(&mut self, lcid: Lcid, bytes: u32) {
        if let Some(ch) = self.channels.get_mut(lcid as usize).and_then(|c| c.as_mut()) {
            let from_retx = bytes.min(ch.buf_retx);
            ch.buf_retx -= from_retx;
            ch.buf_tx = ch.buf_tx.saturating_sub(bytes - from_retx);
        }
    }

    /// Subtract an uplink grant from the reported BSR state, highest
    /// priority group first
    pub fn ul_scheduled(&mut self, mut bytes: u32) {
        for lcg in 0..MAX_LCG {
            let taken = bytes.min(self.lcg_bsr[lcg]);
            self.lcg_bsr[lcg] -= taken;
            bytes -= taken;
            if bytes == 0 {
                break;
            }
        }
    }

    // --- control elements ---

    pub fn push_ta(&mut self, ta_cmd: u8) {
        debug_assert!(ta_cmd < 64);
        self.pending_ces.push_back(PendingCe::TaCmd(ta_cmd & 0x3f));
    }

    pub fn push_conres(&mut self, id: [u8; 6]) {
        self.pending_ces.push_back(PendingCe::ConRes(id));
    }

    pub fn push_scell_activation(&mut self, bitmap: u8) {
        self.pending_ces.push_back(PendingCe::ScellAct(bitmap));
    }

    pub fn ce_pending_bytes(&self) -> u32 {
        self.pending_ces.iter().map(|ce| ce.pdu_bytes()).sum()
    }

    pub fn has_pending_ces(&self) -> bool {
        !self.pending_ces.is_empty()
    }

    pub fn peek_ce(&self) -> Option<&PendingCe> {
        self.pending_ces.front()
    }

    pub fn pop_ce(&mut self) -> Option<PendingCe> {
        self.pending_ces.pop_front()
    }

    pub fn clear_ces(&mut self) {
        self.pending_ces.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mgr_with_bearers() -> LchManager {
        let mut lch = LchManager::new();
        lch.set_cfg(1, LchConfig::srb(1));
        lch.set_cfg(2, LchConfig::srb(3));
        lch.set_cfg(3, LchConfig { direction: LchDirection::Both, lcg: 2, priority: 6, pbr_bytes_per_ms: 8 });
        lch
    }

    #[test]
    fn test_dl_buffer_replaces() {
        let mut lch = mgr_with_bearers();
        lch.dl_buffer(3, 500, 0);
        lch.dl_buffer(3, 200, 50);
        assert_eq!(lch.dl_pending_bytes(), 250);
        assert_eq!(lch.dl_pending_bytes_lcid(3), 250);
    }

    #[test]
    fn test_ul_bsr_replace_and_add() {
        let mut lch = mgr_with_bearers();
        lch.ul_bsr(2, 300);
        lch.ul_bsr(2, 100);
        assert_eq!(lch.ul_pending_bytes(), 100);
        lch.ul_buffer_add(3, 256);
        assert_eq!(lch.ul_pending_bytes(), 356);
    }

    #[test]
    fn test_priority_order_retx_first() {
        let mut lch = mgr_with_bearers();
        lch.dl_buffer(2, 10, 0);
        lch.dl_buffer(1, 10, 0);
        lch.dl_buffer(3, 10, 5);
        // lcid 3 has retransmission data pending, so it jumps the queue
        assert_eq!(lch.prioritized_dl_lcids(), vec![3, 1, 2]);
    }

    #[test]
    fn test_ce_fifo_order_and_sizes() {
        let mut lch = mgr_with_bearers();
        lch.push_ta(31);
        lch.push_conres([0xde, 0xad, 0xbe, 0xef, 0x00, 0x01]);
        lch.push_scell_activation(0b0000_0010);
        assert_eq!(lch.ce_pending_bytes(), 2 + 7 + 2);
        assert_eq!(lch.pop_ce(), Some(PendingCe::TaCmd(31)));
        assert_eq!(lch.pop_ce(), Some(PendingCe::ConRes([0xde, 0xad, 0xbe, 0xef, 0x00, 0x01])));
        assert_eq!(lch.pop_ce(), Some(PendingCe::ScellAct(2)));
        assert_eq!(lch.pop_ce(), None);
    }

    #[test]
    fn test_scheduled_decrements() {
        let mut lch = mgr_with_bearers();
        lch.dl_buffer(3, 100, 40);
        lch.dl_scheduled(3, 60);
        // retx queue drains before the tx queue
        assert_eq!(lch.dl_pending_bytes_lcid(3), 80);
        lch.ul_bsr(0, 50);
        lch.ul_bsr(2, 100);
        lch.ul_scheduled(120);
        assert_eq!(lch.ul_pending_bytes(), 30);
    }
}
