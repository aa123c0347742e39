//! Link controller (C8): drives the link-state machine from PHY interrupt
//! status and the periodic 1 Hz poll, reconfiguring clocks on every
//! transition (spec.md section 4.8).

use crate::rx::UpperStack;
use crate::trace::{self, Trace};
use gem_err::GemError;
use zynq_gem_phy::{LinkSpeed, LinkStatus, Phy, PhyFamily, PhyRw};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LinkState {
    Down,
    Up(LinkSpeed),
}

impl LinkState {
    pub fn is_up(&self) -> bool {
        matches!(self, LinkState::Up(_))
    }
}

/// The capabilities the link controller needs from its owning device:
/// stopping/starting the MAC and reprogramming the TX clock divisors. Kept
/// as a trait, rather than a concrete `Device` borrow, so the state-machine
/// logic below is host-testable against a fake.
pub trait MacControl {
    fn stop(&mut self);
    fn start(&mut self);
    fn reconfigure_clock(&mut self, speed: LinkSpeed);
    /// Runs one extra TX-done reclaim pass. Called before `stop()` on an
    /// up -> up speed change so in-flight frames aren't abandoned mid-ring
    /// (spec.md section 9's resolved Open Question: drain before stop).
    fn drain_tx(&mut self);
}

fn speed_code(speed: LinkSpeed) -> u8 {
    match speed {
        LinkSpeed::Speed10M => 0,
        LinkSpeed::Speed100M => 1,
        LinkSpeed::Speed1G => 2,
    }
}

/// Handles one `POLL_PHY` event (spec.md section 4.8): reads the PHY
/// interrupt-status bits, and only if one of {speed-changed,
/// autoneg-completed, link-status-changed} fired, re-reads link state and
/// drives stop/reconfigure/start around the transition.
pub fn handle_poll_phy<P, F, M, U>(
    phy: &Phy<'_, P>,
    family: &F,
    link_state: &mut LinkState,
    mac: &mut M,
    stack: &mut U,
) -> Result<(), GemError>
where
    P: PhyRw,
    F: PhyFamily<P>,
    M: MacControl,
    U: UpperStack,
{
    let int_status = family.read_int_status(phy)?;
    if !(int_status.speed_changed
        || int_status.autoneg_completed
        || int_status.link_status_changed)
    {
        return Ok(());
    }

    let status: LinkStatus = family.get_link(phy)?;
    let was_up = link_state.is_up();

    if !status.up {
        if was_up {
            mac.stop();
            *link_state = LinkState::Down;
            stack.carrier_off();
            trace::TRACE.record(Trace::LinkDown);
        }
        return Ok(());
    }

    // Up (whether this is the first link-up or a mid-flight speed change):
    // the clock reconfiguration must land between stop and start so the MAC
    // never latches a stale TX clock (spec.md section 4.8).
    if was_up {
        mac.drain_tx();
    }
    mac.stop();
    mac.reconfigure_clock(status.speed);
    *link_state = LinkState::Up(status.speed);
    mac.start();
    stack.carrier_on(status.speed);
    trace::TRACE.record(Trace::LinkUp {
        speed_code: speed_code(status.speed),
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::RefCell;
    use zynq_gem_phy::{Duplex, PhyIntStatus};

    struct FakeBus {
        int_status: RefCell<PhyIntStatus>,
        link: RefCell<LinkStatus>,
    }

    impl PhyRw for FakeBus {
        fn mdio_read(&self, _: u8, _: u8) -> Result<u16, GemError> {
            Ok(0)
        }
        fn mdio_write(&self, _: u8, _: u8, _: u16) -> Result<(), GemError> {
            Ok(())
        }
    }

    struct FakeFamily<'a>(&'a FakeBus);

    impl<'a> PhyFamily<FakeBus> for FakeFamily<'a> {
        fn static_config(
            &self,
            _phy: &Phy<'_, FakeBus>,
            _clock: &impl gem_err::TimeSource,
        ) -> Result<(), GemError> {
            Ok(())
        }
        fn supports_gigabit(&self) -> bool {
            true
        }
        fn read_int_status(
            &self,
            _phy: &Phy<'_, FakeBus>,
        ) -> Result<PhyIntStatus, GemError> {
            Ok(*self.0.int_status.borrow())
        }
        fn get_link(&self, _phy: &Phy<'_, FakeBus>) -> Result<LinkStatus, GemError> {
            Ok(*self.0.link.borrow())
        }
    }

    #[derive(Default)]
    struct FakeMac {
        stopped: u32,
        started: u32,
        drained: u32,
        last_clock: Option<LinkSpeed>,
    }

    impl MacControl for FakeMac {
        fn stop(&mut self) {
            self.stopped += 1;
        }
        fn start(&mut self) {
            self.started += 1;
        }
        fn reconfigure_clock(&mut self, speed: LinkSpeed) {
            self.last_clock = Some(speed);
        }
        fn drain_tx(&mut self) {
            self.drained += 1;
        }
    }

    #[derive(Default)]
    struct FakeStack {
        carrier_on_calls: u32,
        carrier_off_calls: u32,
    }

    impl UpperStack for FakeStack {
        type Packet = ();
        fn allocate_rx_packet(&mut self, _len: usize) -> Option<()> {
            None
        }
        fn submit_rx_packet(&mut self, _packet: ()) -> Result<(), ()> {
            Ok(())
        }
        fn carrier_on(&mut self, _speed: LinkSpeed) {
            self.carrier_on_calls += 1;
        }
        fn carrier_off(&mut self) {
            self.carrier_off_calls += 1;
        }
    }

    #[test]
    fn no_interesting_bits_leaves_state_untouched() {
        let bus = FakeBus {
            int_status: RefCell::new(PhyIntStatus::default()),
            link: RefCell::new(LinkStatus {
                up: false,
                speed: LinkSpeed::Speed1G,
                duplex: Duplex::Full,
            }),
        };
        let phy = Phy::new(7, &bus);
        let family = FakeFamily(&bus);
        let mut state = LinkState::Down;
        let mut mac = FakeMac::default();
        let mut stack = FakeStack::default();

        handle_poll_phy(&phy, &family, &mut state, &mut mac, &mut stack).unwrap();
        assert_eq!(state, LinkState::Down);
        assert_eq!(mac.stopped, 0);
    }

    #[test]
    fn down_to_up_reconfigures_clock_between_stop_and_start() {
        let bus = FakeBus {
            int_status: RefCell::new(PhyIntStatus {
                link_status_changed: true,
                ..Default::default()
            }),
            link: RefCell::new(LinkStatus {
                up: true,
                speed: LinkSpeed::Speed1G,
                duplex: Duplex::Full,
            }),
        };
        let phy = Phy::new(7, &bus);
        let family = FakeFamily(&bus);
        let mut state = LinkState::Down;
        let mut mac = FakeMac::default();
        let mut stack = FakeStack::default();

        handle_poll_phy(&phy, &family, &mut state, &mut mac, &mut stack).unwrap();
        assert_eq!(state, LinkState::Up(LinkSpeed::Speed1G));
        assert_eq!(mac.stopped, 1);
        assert_eq!(mac.started, 1);
        assert_eq!(mac.last_clock, Some(LinkSpeed::Speed1G));
        assert_eq!(mac.drained, 0);
        assert_eq!(stack.carrier_on_calls, 1);
    }

    #[test]
    fn up_to_down_notifies_carrier_off_and_stops() {
        let bus = FakeBus {
            int_status: RefCell::new(PhyIntStatus {
                link_status_changed: true,
                ..Default::default()
            }),
            link: RefCell::new(LinkStatus {
                up: false,
                speed: LinkSpeed::Speed1G,
                duplex: Duplex::Full,
            }),
        };
        let phy = Phy::new(7, &bus);
        let family = FakeFamily(&bus);
        let mut state = LinkState::Up(LinkSpeed::Speed100M);
        let mut mac = FakeMac::default();
        let mut stack = FakeStack::default();

        handle_poll_phy(&phy, &family, &mut state, &mut mac, &mut stack).unwrap();
        assert_eq!(state, LinkState::Down);
        assert_eq!(mac.stopped, 1);
        assert_eq!(mac.started, 0);
        assert_eq!(stack.carrier_off_calls, 1);
    }

    #[test]
    fn up_to_up_speed_change_drains_before_stopping() {
        let bus = FakeBus {
            int_status: RefCell::new(PhyIntStatus {
                speed_changed: true,
                ..Default::default()
            }),
            link: RefCell::new(LinkStatus {
                up: true,
                speed: LinkSpeed::Speed100M,
                duplex: Duplex::Full,
            }),
        };
        let phy = Phy::new(7, &bus);
        let family = FakeFamily(&bus);
        let mut state = LinkState::Up(LinkSpeed::Speed1G);
        let mut mac = FakeMac::default();
        let mut stack = FakeStack::default();

        handle_poll_phy(&phy, &family, &mut state, &mut mac, &mut stack).unwrap();
        assert_eq!(state, LinkState::Up(LinkSpeed::Speed100M));
        assert_eq!(mac.drained, 1);
        assert_eq!(mac.stopped, 1);
        assert_eq!(mac.started, 1);
    }
}
