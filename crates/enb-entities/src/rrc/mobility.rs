//! Mobility: measurement-report handling, intra-station handover and S1
//! handover preparation.

use enb_core::{Rnti, LCID_SRB1, LCID_SRB2};
use enb_pdus::rrc::meas::MeasReport;
use enb_pdus::rrc::msgs::{DlDcchMsg, DrbCfg, HandoverPreparationInfo, MobilityControlInfo};
use enb_saps::pdcp::PdcpBearerCfg;
use enb_saps::rlc::{RlcBearerCfg, RlcMode};

use super::ue::{ActivityPhase, HoCtx, RrcState};
use super::Rrc;
use crate::mac::lch::LchConfig;

impl Rrc {
    /// Entry point for an uplink measurement report
    pub(super) fn handle_meas_report(&mut self, rnti: Rnti, report: MeasReport) {
        let Some(user) = self.users.get(&rnti) else {
            return;
        };

        // strongest reported neighbour decides the target
        let Some(best) = report.neighbours.iter().max_by_key(|n| n.rsrp) else {
            tracing::debug!("measurement report without neighbours, rnti=0x{:x}", rnti);
            return;
        };

        // the PCI must be a configured neighbour of a measurement object
        if user.meas_cfg.find_cell(best.pci).is_none() {
            tracing::warn!("report for unknown neighbour pci={}, rnti=0x{:x}: dropping", best.pci, rnti);
            return;
        }

        if user.ho.is_some() {
            tracing::debug!("handover already in progress, rnti=0x{:x}: dropping report", rnti);
            return;
        }

        let target_is_ours = self.cfg.config().cells.by_pci(best.pci).is_some();
        if target_is_ours {
            self.start_intra_handover(rnti, best.pci);
        } else {
            self.start_s1_handover(rnti, best.pci);
        }
    }

    /// Intra-station handover: a reconfiguration with mobility-control-info
    /// carrying a fresh C-RNTI on the target cell. The user context moves
    /// to the new identity at once; the radio follows with the C-RNTI CE.
    pub(super) fn start_intra_handover(&mut self, old_rnti: Rnti, target_pci: u16) {
        let new_rnti = match self.mac.alloc_ue() {
            Ok(r) => r,
            Err(e) => {
                tracing::error!("intra handover admission failed for rnti=0x{:x}: {:?}", old_rnti, e);
                return;
            }
        };

        let Some(mut user) = self.users.remove(&old_rnti) else {
            self.mac.ue_rem(new_rnti);
            return;
        };
        user.rnti = new_rnti;
        user.prev_rnti = Some(old_rnti);
        user.ho = Some(HoCtx::Intra { target_pci, old_rnti });
        let transaction_id = user.next_transaction_id();
        user.state = RrcState::WaitReconfComplete;
        let timer = user.activity_timer;
        self.users.insert(new_rnti, user);
        if let Some(owner) = self.timer_owners.get_mut(&timer) {
            owner.0 = new_rnti;
        }

        tracing::info!(
            "intra handover rnti=0x{:x} -> 0x{:x}, target pci={}",
            old_rnti,
            new_rnti,
            target_pci
        );
        // the command still travels on the source identity's SRB1
        let msg = DlDcchMsg::Reconfiguration(enb_pdus::rrc::msgs::Reconfiguration {
            transaction_id,
            meas_cfg: None,
            mobility: Some(MobilityControlInfo {
                target_pci,
                new_crnti: new_rnti,
                t304_ms: 1000,
                carrier_freq: None,
            }),
            rr_cfg: None,
            nas: Vec::new(),
        });
        self.pdcp.write_dcch(old_rnti, LCID_SRB1, &msg);
        self.set_activity_timeout(new_rnti, ActivityPhase::Response);
    }

    /// S1 handover: package the user's radio context and hand it to the
    /// signalling layer
    fn start_s1_handover(&mut self, rnti: Rnti, target_pci: u16) {
        let source_pci = self.cfg.config().cells.iter().next().map(|c| c.pci).unwrap_or(0);
        let Some(user) = self.users.get_mut(&rnti) else {
            return;
        };
        let (Some(cipher), Some(integ)) = (user.sec.cipher, user.sec.integ) else {
            tracing::warn!("S1 handover before security, rnti=0x{:x}: dropping", rnti);
            return;
        };
        let drbs: Vec<DrbCfg> = user
            .erabs
            .values()
            .map(|e| DrbCfg {
                drb_id: e.drb_id,
                lcid: e.lcid,
                erab_id: e.erab_id,
                qci: e.qci,
                priority: 4 + e.drb_id,
                lcg: 2,
            })
            .collect();
        user.ho = Some(HoCtx::S1 { target_pci });
        let container = HandoverPreparationInfo {
            ue_identity: 0,
            eea: user.sec.caps.eea,
            eia: user.sec.caps.eia,
            drbs,
            source_pci,
            cipher_algo: cipher,
            integ_algo: integ,
        };
        tracing::info!("S1 handover required rnti=0x{:x} target pci={}", rnti, target_pci);
        self.s1ap.handover_required(rnti, target_pci, &container);
    }

    /// Core-network answer to a handover-required
    pub(super) fn handle_ho_command(&mut self, rnti: Rnti, success: bool, container: Vec<u8>) {
        let Some(user) = self.users.get_mut(&rnti) else {
            return;
        };
        match user.ho {
            Some(HoCtx::S1 { target_pci }) => {
                if success {
                    tracing::info!("handover command rnti=0x{:x} pci={}: forwarding", rnti, target_pci);
                    self.pdcp.write_dcch(rnti, LCID_SRB1, &DlDcchMsg::HandoverCommand { container });
                    // the user leaves; the core network releases the context
                } else {
                    tracing::warn!("handover preparation failed rnti=0x{:x}: staying on source", rnti);
                    user.ho = None;
                }
            }
            _ => tracing::warn!("handover command without S1 handover in progress, rnti=0x{:x}", rnti),
        }
    }

    /// A C-RNTI control element arrived in a Msg3 from `temp_rnti`,
    /// announcing `announced` as the user's existing identity.
    pub fn handle_crnti_ce(&mut self, temp_rnti: Rnti, announced: Rnti) {
        if temp_rnti == announced {
            return;
        }
        let Some(user) = self.users.get(&announced) else {
            tracing::error!(
                "C-RNTI CE announces 0x{:x} which is not known; already released?",
                announced
            );
            return;
        };

        match &user.ho {
            Some(HoCtx::Intra { .. }) => self.complete_intra_handover(temp_rnti, announced),
            None if user.prev_rnti.is_some() => {
                // duplicate CE after a completed migration: drop the stray
                // temporary identity, emit nothing, change nothing
                tracing::debug!(
                    "duplicate C-RNTI CE 0x{:x} -> 0x{:x}: ignoring",
                    temp_rnti,
                    announced
                );
                self.drop_user_silent(temp_rnti);
            }
            _ => {
                // uplink resync: fold the temporary identity into the
                // announced one and keep going
                if let Err(e) = self.mac.ue_migrate_crnti(temp_rnti, announced) {
                    tracing::warn!("C-RNTI migration failed: {:?}", e);
                    return;
                }
                self.drop_user_silent(temp_rnti);
                self.set_activity_user(announced);
            }
        }
    }

    /// The handed-over user arrived on the target: migrate the radio
    /// identity and re-establish SRB1/SRB2 and every DRB
    fn complete_intra_handover(&mut self, temp_rnti: Rnti, new_rnti: Rnti) {
        if let Err(e) = self.mac.ue_migrate_crnti(temp_rnti, new_rnti) {
            tracing::warn!("intra handover migration failed: {:?}", e);
            return;
        }
        self.drop_user_silent(temp_rnti);

        let Some(user) = self.users.get_mut(&new_rnti) else {
            return;
        };
        let old_rnti = match user.ho.take() {
            Some(HoCtx::Intra { old_rnti, .. }) => old_rnti,
            _ => return,
        };
        let sec = (user.sec.keys, user.sec.cipher, user.sec.integ);
        let drb_lcids: Vec<(u8, u8)> = user.erabs.values().map(|e| (e.lcid, e.drb_id)).collect();

        // the source-side radio identity is gone
        self.mac.ue_rem(old_rnti);

        self.rlc.reestablish(new_rnti);
        self.pdcp.reestablish(new_rnti);

        // SRBs and DRBs come back under the new identity
        let _ = self.mac.bearer_ue_cfg(new_rnti, LCID_SRB1, LchConfig::srb(1));
        let _ = self.mac.bearer_ue_cfg(new_rnti, LCID_SRB2, LchConfig::srb(3));
        self.rlc.add_bearer(new_rnti, LCID_SRB1, &RlcBearerCfg { mode: RlcMode::Am });
        self.rlc.add_bearer(new_rnti, LCID_SRB2, &RlcBearerCfg { mode: RlcMode::Am });
        self.pdcp.add_bearer(new_rnti, LCID_SRB1, &PdcpBearerCfg { is_srb: true });
        self.pdcp.add_bearer(new_rnti, LCID_SRB2, &PdcpBearerCfg { is_srb: true });
        for (lcid, drb_id) in &drb_lcids {
            let _ = self.mac.bearer_ue_cfg(
                new_rnti,
                *lcid,
                LchConfig {
                    direction: crate::mac::lch::LchDirection::Both,
                    lcg: 2,
                    priority: 4 + drb_id,
                    pbr_bytes_per_ms: 0,
                },
            );
            self.rlc.add_bearer(new_rnti, *lcid, &RlcBearerCfg { mode: RlcMode::Am });
            self.pdcp.add_bearer(new_rnti, *lcid, &PdcpBearerCfg { is_srb: false });
        }
        if let (Some(keys), Some(cipher), Some(integ)) = sec {
            self.pdcp.config_security(new_rnti, LCID_SRB1, &keys, cipher, integ);
            self.pdcp.enable_integrity(new_rnti, LCID_SRB1);
            self.pdcp.enable_encryption(new_rnti, LCID_SRB1);
        }
        // queue the contention-resolution CE so the target confirms Msg3
        let _ = self.mac.queue_conres_ce(new_rnti);
        self.set_activity_user(new_rnti);
        tracing::info!("intra handover complete: 0x{:x} now serving (was 0x{:x})", new_rnti, old_rnti);
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::super::ue::RrcState;
    use super::*;
    use enb_pdus::rrc::meas::MeasResult;

    fn report(pci: u16) -> MeasReport {
        MeasReport {
            meas_id: 1,
            serving_rsrp: -100,
            serving_rsrq: -12,
            neighbours: vec![MeasResult { pci, rsrp: -80, rsrq: -10 }],
        }
    }

    #[test]
    fn test_intra_handover_flow() {
        let mut bench = TestBench::two_cells();
        let rnti = bench.connect_registered();

        // neighbour pci=2 reported above threshold
        bench.rrc.handle_meas_report(rnti, report(2));

        // reconfiguration with mobility info went out on the old identity
        let (new_rnti, target_pci) = bench.pdcp.last_mobility(rnti).expect("mobility reconfiguration");
        assert_eq!(target_pci, 2);
        assert_ne!(new_rnti, rnti);
        assert_eq!(bench.rrc.user_state(new_rnti), Some(RrcState::WaitReconfComplete));

        // the UE arrives on the target via RACH; Msg3 carries the C-RNTI CE
        let temp = bench.rach();
        bench.rrc.handle_crnti_ce(temp, new_rnti);

        // bearers re-established, old and temporary identities gone
        assert!(bench.rlc.reestablished(new_rnti));
        assert!(bench.pdcp.reestablished(new_rnti));
        assert!(!bench.mac.ue_exists(rnti));
        assert!(!bench.mac.ue_exists(temp));
        assert!(bench.mac.ue_exists(new_rnti));

        // reconfiguration complete lands the user back in registered
        let txn = bench.rrc.users.get(&new_rnti).unwrap().current_transaction_id();
        bench.rrc.ul_dcch(new_rnti, enb_core::LCID_SRB1, enb_pdus::rrc::msgs::UlDcchMsg::ReconfigurationComplete { transaction_id: txn });
        assert_eq!(bench.rrc.user_state(new_rnti), Some(RrcState::Registered));
    }

    #[test]
    fn test_duplicate_crnti_ce_ignored() {
        let mut bench = TestBench::two_cells();
        let rnti = bench.connect_registered();
        bench.rrc.handle_meas_report(rnti, report(2));
        let (new_rnti, _) = bench.pdcp.last_mobility(rnti).unwrap();

        let temp1 = bench.rach();
        bench.rrc.handle_crnti_ce(temp1, new_rnti);
        let state_before = bench.rrc.user_state(new_rnti);
        let msgs_before = bench.pdcp.nof_dcch_msgs();

        // second CE for the same mapping: ignored, nothing emitted
        let temp2 = bench.rach();
        bench.rrc.handle_crnti_ce(temp2, new_rnti);
        assert_eq!(bench.rrc.user_state(new_rnti), state_before);
        assert_eq!(bench.pdcp.nof_dcch_msgs(), msgs_before);
        assert!(!bench.mac.ue_exists(temp2), "stray temporary identity cleaned up");
    }

    #[test]
    fn test_unknown_pci_dropped() {
        let mut bench = TestBench::two_cells();
        let rnti = bench.connect_registered();
        let msgs_before = bench.pdcp.nof_dcch_msgs();
        bench.rrc.handle_meas_report(rnti, report(999));
        assert_eq!(bench.pdcp.nof_dcch_msgs(), msgs_before);
        assert!(bench.rrc.users.get(&rnti).unwrap().ho.is_none());
    }

    #[test]
    fn test_report_during_handover_dropped() {
        let mut bench = TestBench::two_cells();
        let rnti = bench.connect_registered();
        bench.rrc.handle_meas_report(rnti, report(2));
        let (new_rnti, _) = bench.pdcp.last_mobility(rnti).unwrap();
        let msgs_before = bench.pdcp.nof_dcch_msgs();
        bench.rrc.handle_meas_report(new_rnti, report(2));
        assert_eq!(bench.pdcp.nof_dcch_msgs(), msgs_before);
    }

    #[test]
    fn test_s1_handover_roundtrip() {
        let mut bench = TestBench::new();
        let rnti = bench.connect_registered_with_neighbour(99);

        bench.rrc.handle_meas_report(rnti, report(99));
        assert!(bench.s1ap.ho_required(rnti));

        // failure keeps the user on the source cell
        bench.rrc.s1_event(enb_saps::events::S1Event::HandoverCommand { rnti, success: false, container: vec![] });
        assert!(bench.rrc.users.get(&rnti).unwrap().ho.is_none());

        // a later attempt succeeds and the container goes to the user
        bench.rrc.handle_meas_report(rnti, report(99));
        bench.rrc.s1_event(enb_saps::events::S1Event::HandoverCommand { rnti, success: true, container: vec![1, 2, 3] });
        assert!(bench.pdcp.sent_ho_command(rnti));
    }
}
