// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 syncsim contributors

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use rand::Rng;
use rand::rngs::StdRng;
use tracing::{info, trace};

use crate::channel::{Channel, ChannelHandle};
use crate::constants::{DEFAULT_BOOT_WINDOW, N_LOCAL_MAX, N_LOCAL_MIN, TIMEOUT_JITTER, TIMEOUT_MAX, TIMEOUT_MIN};
use crate::error::{Error, Result};
use crate::event::EventHandle;
use crate::message::{Message, PeerId};
use crate::scheduler::Scheduler;

pub type PeerHandle = Rc<RefCell<Peer>>;

/// The six synchronization states plus the transient reboot state. Named
/// for the pair of local/remote handshake phases they represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Reboot,
    InitInit,
    InitOk,
    SyncOk,
    SyncInit,
    OkInit,
    OkOk,
}

/// Counters tracked across a peer's lifetime. Preserved across reboots —
/// only `reboots` itself advances on a reboot; everything else keeps
/// accumulating.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub data_recv: u64,
    pub data_sent: u64,
    pub data_not_ok: u64,
    pub reset_recv: u64,
    pub reset_sent: u64,
    pub resetack_recv: u64,
    pub resetack_sent: u64,
    pub reboots: u64,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "data(recv={} sent={} not_ok={}) reset(recv={} sent={}) resetack(recv={} sent={}) reboots={}",
            self.data_recv,
            self.data_sent,
            self.data_not_ok,
            self.reset_recv,
            self.reset_sent,
            self.resetack_recv,
            self.resetack_sent,
            self.reboots
        )
    }
}

struct RebootPlan {
    after: f64,
    delay: f64,
    recurring: bool,
    armed: bool,
}

/// One side of the handshake. Owns its outbound channel and a non-owning
/// reference to its peer (set once via [`Peer::set_peer`]) so the pair
/// doesn't form an `Rc` cycle.
pub struct Peer {
    name: PeerId,
    channel: ChannelHandle,
    rng: Rc<RefCell<StdRng>>,
    peer: Option<Weak<RefCell<Peer>>>,

    state: State,
    n_local: u16,
    n_remote: u16,
    fsn_local: u32,
    fsn_remote: u32,
    timeout: f64,
    timeout_event: Option<EventHandle>,

    ready: bool,
    reboot_plan: RebootPlan,

    stats: Stats,
}

impl Peer {
    /// Construct a peer and arm its one-shot bootstrap reboot, drawn from
    /// the default `[1.0, 2.0)` window.
    pub fn new(sched: &mut Scheduler, name: impl Into<Arc<str>>, channel: ChannelHandle, rng: Rc<RefCell<StdRng>>) -> PeerHandle {
        Self::new_with_boot_window(sched, name, channel, rng, DEFAULT_BOOT_WINDOW)
    }

    /// As [`Peer::new`], but with a configurable bootstrap delay window —
    /// exposed so tests can make the bootstrap delay small and deterministic.
    pub fn new_with_boot_window(
        sched: &mut Scheduler,
        name: impl Into<Arc<str>>,
        channel: ChannelHandle,
        rng: Rc<RefCell<StdRng>>,
        boot_window: (f64, f64),
    ) -> PeerHandle {
        let name = name.into();
        let boot_delay = {
            let (lo, hi) = boot_window;
            if lo == hi { lo } else { rng.borrow_mut().random_range(lo..hi) }
        };

        let peer = Rc::new(RefCell::new(Self {
            name,
            channel,
            rng,
            peer: None,
            state: State::Reboot,
            n_local: 0,
            n_remote: 0,
            fsn_local: 0,
            fsn_remote: 0,
            timeout: TIMEOUT_MIN,
            timeout_event: None,
            ready: true,
            reboot_plan: RebootPlan { after: boot_delay, delay: 0.0, recurring: false, armed: true },
            stats: Stats::default(),
        }));

        Peer::schedule_reboot(&peer, sched);
        peer
    }

    pub fn set_peer(this: &PeerHandle, other: &PeerHandle) {
        this.borrow_mut().peer = Some(Rc::downgrade(other));
    }

    pub fn name(&self) -> &PeerId {
        &self.name
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub fn n_remote(&self) -> u16 {
        self.n_remote
    }

    pub fn is_data_ready(&self) -> bool {
        self.state == State::OkOk
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn print_stats(&self) {
        info!(peer = %self.name, stats = %self.stats, "peer stats");
    }

    /// Arm (or re-arm) a future reboot. If the peer is already synchronized,
    /// the reboot is scheduled immediately; otherwise it takes effect the
    /// next time the currently-armed reboot (if any) fires and this plan is
    /// consulted, matching the original's reuse of a single pending slot.
    pub fn reboot_after(this: &PeerHandle, sched: &mut Scheduler, after: f64, delay: f64, recurring: bool) {
        let already_ready = {
            let mut p = this.borrow_mut();
            p.reboot_plan = RebootPlan { after, delay, recurring, armed: true };
            p.is_data_ready()
        };
        if already_ready {
            Peer::schedule_reboot(this, sched);
        }
    }

    fn peer_handle(&self) -> Result<PeerHandle> {
        self.peer.as_ref().and_then(Weak::upgrade).ok_or(Error::NilPeer)
    }

    fn reset_timeout(&mut self) {
        self.timeout = TIMEOUT_MIN;
    }

    fn increase_timeout(&mut self) {
        if self.timeout < TIMEOUT_MAX {
            self.timeout = (self.timeout * 2.0).min(TIMEOUT_MAX);
        }
    }

    fn sample_timeout_delay(&self) -> f64 {
        let jitter = self.rng.borrow_mut().random_range(0.0..TIMEOUT_JITTER);
        self.timeout + jitter
    }

    fn schedule_reboot(this: &PeerHandle, sched: &mut Scheduler) {
        let (delay, recurring) = {
            let p = this.borrow();
            (p.reboot_plan.after, p.reboot_plan.recurring)
        };
        if !this.borrow().reboot_plan.armed {
            return;
        }
        sched
            .schedule_peer_reboot_start(delay, Rc::clone(this))
            .expect("reboot delay is sampled non-negative");
        this.borrow_mut().reboot_plan.armed = recurring;
    }

    pub(crate) fn fire_reboot_start(this: &PeerHandle, sched: &mut Scheduler) -> Result<()> {
        let delay = {
            let mut p = this.borrow_mut();
            trace!(peer = %p.name, "reboot starting");
            p.ready = false;
            p.reboot_plan.delay
        };
        Channel::clear(&this.borrow().channel.clone());
        Peer::cancel_timer(this);
        sched
            .schedule_peer_reboot_finished(delay, Rc::clone(this))
            .expect("reboot delay is sampled non-negative");
        Ok(())
    }

    pub(crate) fn fire_reboot_finished(this: &PeerHandle, sched: &mut Scheduler) -> Result<()> {
        {
            let mut p = this.borrow_mut();
            p.state = State::Reboot;
            p.n_local = 0;
            p.n_remote = 0;
            p.fsn_local = 0;
            p.fsn_remote = 0;
            p.timeout = TIMEOUT_MIN;
            p.timeout_event = None;
            p.stats.reboots += 1;
            p.ready = true;
            trace!(peer = %p.name, "reboot finished");
        }
        Peer::master_start(this, sched)
    }

    fn master_start(this: &PeerHandle, sched: &mut Scheduler) -> Result<()> {
        {
            let mut p = this.borrow_mut();
            p.state = State::InitInit;
            let n_local = p.rng.borrow_mut().random_range(N_LOCAL_MIN..=N_LOCAL_MAX);
            p.n_local = n_local;
            p.reset_timeout();
        }
        Peer::send_reset(this, sched)?;
        Peer::start_timer(this, sched)?;
        this.borrow_mut().state = State::SyncInit;
        Ok(())
    }

    fn send_reset(this: &PeerHandle, sched: &mut Scheduler) -> Result<()> {
        let (destination, message, channel) = {
            let mut p = this.borrow_mut();
            assert!(p.ready, "send_reset called while peer is rebooting");
            p.stats.reset_sent += 1;
            let message = Message::Reset { sender: Arc::clone(&p.name), reset_number: p.n_local };
            let destination = p.peer_handle()?;
            (destination, message, Rc::clone(&p.channel))
        };
        Channel::enqueue(&channel, sched, destination, message);
        Ok(())
    }

    fn send_resetack(this: &PeerHandle, sched: &mut Scheduler) -> Result<()> {
        let (destination, message, channel) = {
            let mut p = this.borrow_mut();
            assert!(p.ready, "send_resetack called while peer is rebooting");
            p.stats.resetack_sent += 1;
            let message =
                Message::ResetAck { sender: Arc::clone(&p.name), reset_number: p.n_local, ack_number: p.n_remote };
            let destination = p.peer_handle()?;
            (destination, message, Rc::clone(&p.channel))
        };
        Channel::enqueue(&channel, sched, destination, message);
        Ok(())
    }

    /// Queue an application data frame. Not gated on state: whether it's
    /// admitted is up to the receiver's current state.
    pub fn send_data(
        this: &PeerHandle,
        sched: &mut Scheduler,
        fragment_id: u32,
        payload: Arc<[u8]>,
        begin: bool,
        end: bool,
    ) -> Result<()> {
        let (destination, message, channel) = {
            let mut p = this.borrow_mut();
            p.stats.data_sent += 1;
            p.fsn_local = p.fsn_local.wrapping_add(1);
            let message = Message::Data {
                sender: Arc::clone(&p.name),
                fragment_id,
                length: payload.len() as u32,
                payload: Arc::clone(&payload),
                begin,
                end,
            };
            let destination = p.peer_handle()?;
            (destination, message, Rc::clone(&p.channel))
        };
        Channel::enqueue(&channel, sched, destination, message);
        Ok(())
    }

    fn cancel_timer(this: &PeerHandle) {
        let mut p = this.borrow_mut();
        if let Some(event) = p.timeout_event.take() {
            event.cancel();
        }
    }

    fn start_timer(this: &PeerHandle, sched: &mut Scheduler) -> Result<()> {
        let delay = {
            let p = this.borrow();
            assert!(p.ready, "start_timer called while peer is rebooting");
            if p.timeout_event.is_some() {
                return Err(Error::TimerAlreadyPending);
            }
            p.sample_timeout_delay()
        };
        let handle = sched.schedule_peer_timeout(delay, Rc::clone(this)).expect("timeout delay is non-negative");
        this.borrow_mut().timeout_event = Some(handle);
        Ok(())
    }

    pub(crate) fn fire_timeout(this: &PeerHandle, sched: &mut Scheduler) -> Result<()> {
        if !this.borrow().ready {
            return Ok(());
        }
        this.borrow_mut().timeout_event = None;
        let state = this.borrow().state;
        match state {
            State::SyncOk | State::SyncInit => {
                this.borrow_mut().increase_timeout();
                Peer::send_reset(this, sched)?;
                Peer::start_timer(this, sched)?;
                Ok(())
            }
            other => unreachable!("retransmit timeout fired in illegal state {other:?}"),
        }
    }

    /// Dispatch an inbound message. Silently dropped while the peer is
    /// rebooting (`is_ready() == false`).
    pub(crate) fn receive(this: &PeerHandle, sched: &mut Scheduler, message: Message) -> Result<()> {
        if !this.borrow().ready {
            return Ok(());
        }
        match message {
            Message::Reset { reset_number, .. } => Peer::receive_reset(this, sched, reset_number),
            Message::ResetAck { reset_number, ack_number, .. } => {
                Peer::receive_resetack(this, sched, reset_number, ack_number)
            }
            Message::Data { .. } => {
                Peer::receive_data(this);
                Ok(())
            }
        }
    }

    fn receive_reset(this: &PeerHandle, sched: &mut Scheduler, reset_number: u16) -> Result<()> {
        this.borrow_mut().stats.reset_recv += 1;
        let prior_ready = this.borrow().is_data_ready();
        let state = this.borrow().state;

        match state {
            State::Reboot => {}
            State::InitInit => {
                this.borrow_mut().n_remote = reset_number;
                Peer::send_resetack(this, sched)?;
                this.borrow_mut().state = State::InitOk;
                Peer::send_reset(this, sched)?;
                Peer::start_timer(this, sched)?;
                this.borrow_mut().state = State::SyncOk;
            }
            State::InitOk => {
                this.borrow_mut().n_remote = reset_number;
                Peer::send_resetack(this, sched)?;
            }
            State::SyncOk => {
                let matches = this.borrow().n_remote == reset_number;
                if matches {
                    Peer::send_resetack(this, sched)?;
                } else {
                    Peer::cancel_timer(this);
                    {
                        let mut p = this.borrow_mut();
                        p.n_remote = reset_number;
                        p.fsn_local = 0;
                        p.fsn_remote = 0;
                    }
                    Peer::send_resetack(this, sched)?;
                    this.borrow_mut().state = State::InitOk;
                    Peer::send_reset(this, sched)?;
                    Peer::start_timer(this, sched)?;
                    this.borrow_mut().state = State::SyncOk;
                }
            }
            State::SyncInit => {
                this.borrow_mut().n_remote = reset_number;
                Peer::send_resetack(this, sched)?;
                this.borrow_mut().state = State::SyncOk;
            }
            State::OkInit => {
                this.borrow_mut().n_remote = reset_number;
                Peer::send_resetack(this, sched)?;
                this.borrow_mut().state = State::OkOk;
            }
            State::OkOk => {
                let matches = this.borrow().n_remote == reset_number;
                if matches {
                    Peer::send_resetack(this, sched)?;
                } else {
                    {
                        let mut p = this.borrow_mut();
                        p.n_remote = reset_number;
                        p.fsn_local = 0;
                        p.fsn_remote = 0;
                    }
                    Peer::send_resetack(this, sched)?;
                    this.borrow_mut().state = State::InitOk;
                    Peer::send_reset(this, sched)?;
                    Peer::start_timer(this, sched)?;
                    this.borrow_mut().state = State::SyncOk;
                }
            }
        }

        Peer::maybe_start_data_queue(this, sched, prior_ready);
        Ok(())
    }

    fn receive_resetack(this: &PeerHandle, sched: &mut Scheduler, reset_number: u16, ack_number: u16) -> Result<()> {
        this.borrow_mut().stats.resetack_recv += 1;
        let prior_ready = this.borrow().is_data_ready();
        let state = this.borrow().state;

        match state {
            State::Reboot => {}
            State::InitInit => unreachable!("ResetAck received in illegal state InitInit"),
            State::InitOk => unreachable!("ResetAck received in illegal state InitOk"),
            State::SyncOk => {
                let n_local = this.borrow().n_local;
                if ack_number == n_local {
                    Peer::cancel_timer(this);
                    this.borrow_mut().reset_timeout();
                    let matches = this.borrow().n_remote == reset_number;
                    if matches {
                        this.borrow_mut().state = State::OkOk;
                    } else {
                        {
                            let mut p = this.borrow_mut();
                            p.n_remote = reset_number;
                            p.fsn_local = 0;
                            p.fsn_remote = 0;
                        }
                        Peer::send_resetack(this, sched)?;
                        this.borrow_mut().state = State::InitOk;
                        Peer::send_reset(this, sched)?;
                        Peer::start_timer(this, sched)?;
                        this.borrow_mut().state = State::SyncOk;
                    }
                }
                // ack_number mismatch: stale ack, ignore.
            }
            State::SyncInit => {
                let n_local = this.borrow().n_local;
                if ack_number == n_local {
                    Peer::cancel_timer(this);
                    this.borrow_mut().reset_timeout();
                    // Atomic pair: OkInit is never observed outside this
                    // function body (no public setter for state exists).
                    this.borrow_mut().state = State::OkInit;
                    this.borrow_mut().n_remote = reset_number;
                    Peer::send_resetack(this, sched)?;
                    this.borrow_mut().state = State::OkOk;
                }
            }
            State::OkInit | State::OkOk => {}
        }

        Peer::maybe_start_data_queue(this, sched, prior_ready);
        Ok(())
    }

    fn receive_data(this: &PeerHandle) {
        let mut p = this.borrow_mut();
        p.stats.data_recv += 1;
        let admitted = matches!(p.state, State::InitOk | State::SyncOk | State::OkOk);
        if !admitted {
            p.stats.data_not_ok += 1;
        }
    }

    fn maybe_start_data_queue(this: &PeerHandle, sched: &mut Scheduler, prior_ready: bool) {
        let now_ready = this.borrow().is_data_ready();
        if !prior_ready && now_ready {
            Peer::schedule_reboot(this, sched);
        }
    }
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("n_local", &self.n_local)
            .field("n_remote", &self.n_remote)
            .field("ready", &self.ready)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Channel;
    use crate::delay::DelaySource;
    use rand::SeedableRng;

    fn rig() -> (Scheduler, Rc<RefCell<StdRng>>) {
        (Scheduler::new(), Rc::new(RefCell::new(StdRng::seed_from_u64(123))))
    }

    fn make_peer(sched: &mut Scheduler, rng: Rc<RefCell<StdRng>>, name: &str) -> PeerHandle {
        let channel = Channel::new(0.0, DelaySource::uniform(0.0, 0.0).unwrap(), Rc::clone(&rng)).unwrap();
        Peer::new_with_boot_window(sched, name, channel, rng, (0.0, 0.0))
    }

    fn wire_pair(sched: &mut Scheduler, rng: Rc<RefCell<StdRng>>) -> (PeerHandle, PeerHandle) {
        let a = make_peer(sched, Rc::clone(&rng), "ALICE");
        let b = make_peer(sched, rng, "BOB");
        Peer::set_peer(&a, &b);
        Peer::set_peer(&b, &a);
        (a, b)
    }

    /// A single peer, self-wired so its own sends have somewhere harmless to
    /// go. Driving exactly two scheduler events (its bootstrap reboot_start
    /// then reboot_finished) deterministically lands it in SYNC_INIT with no
    /// risk of interleaving against a second peer's own bootstrap events.
    fn solo_peer_past_bootstrap(sched: &mut Scheduler, rng: Rc<RefCell<StdRng>>) -> PeerHandle {
        let peer = make_peer(sched, rng, "ALICE");
        Peer::set_peer(&peer, &peer);
        sched.run_count(2).unwrap();
        assert_eq!(peer.borrow().state(), State::SyncInit);
        assert!(peer.borrow().is_ready());
        peer
    }

    #[test]
    fn two_peers_converge_to_ok_ok_with_no_loss() {
        let (mut sched, rng) = rig();
        let (alice, bob) = wire_pair(&mut sched, rng);
        sched.run_count(200).unwrap();
        assert!(alice.borrow().is_data_ready());
        assert!(bob.borrow().is_data_ready());
        assert!(alice.borrow().stats().reset_sent >= 1);
        assert!(bob.borrow().stats().resetack_sent >= 1);
    }

    #[test]
    fn reset_recv_counter_increments_on_every_received_reset() {
        // The reference implementation declares and prints this counter but
        // never increments it anywhere in its Reset handler — treated here
        // as an oversight rather than documented behavior: reset-recv is an
        // ordinary tracked counter with no caveat attached to it (unlike the
        // FSN-reset typo, which is called out explicitly).
        let (mut sched, rng) = rig();
        let (alice, bob) = wire_pair(&mut sched, rng);
        sched.run_count(200).unwrap();
        assert!(alice.borrow().stats().reset_recv >= 1);
        assert!(bob.borrow().stats().reset_recv >= 1);
    }

    #[test]
    fn init_ok_admits_data_as_ok() {
        // INIT_OK is a transient waypoint in every externally-driven
        // transition (every path through it continues on to SYNC_OK inside
        // the same call), so it is never a resting state reachable through
        // the public transition functions. The behavior this test pins down
        // — that a peer nominally in INIT_OK admits data as ok rather than
        // not-ok — is still part of the documented transition table, so it
        // is exercised by setting the state directly.
        let (mut sched, rng) = rig();
        let alice = solo_peer_past_bootstrap(&mut sched, rng);
        alice.borrow_mut().state = State::InitOk;
        Peer::receive_data(&alice);
        assert_eq!(alice.borrow().stats().data_not_ok, 0);
        assert_eq!(alice.borrow().stats().data_recv, 1);
    }

    #[test]
    #[should_panic(expected = "illegal state")]
    fn resetack_in_init_ok_is_illegal() {
        let (mut sched, rng) = rig();
        let alice = solo_peer_past_bootstrap(&mut sched, rng);
        alice.borrow_mut().state = State::InitOk;
        let n_local = alice.borrow().n_local;
        Peer::receive_resetack(&alice, &mut sched, 7, n_local).unwrap();
    }

    #[test]
    #[should_panic(expected = "illegal state")]
    fn timeout_in_ok_ok_is_illegal() {
        let (mut sched, rng) = rig();
        let (alice, _bob) = wire_pair(&mut sched, rng);
        sched.run_count(200).unwrap();
        assert!(alice.borrow().is_data_ready());
        Peer::fire_timeout(&alice, &mut sched).unwrap();
    }

    #[test]
    fn mismatched_reset_in_sync_ok_restarts_the_handshake_leg() {
        let (mut sched, rng) = rig();
        let alice = solo_peer_past_bootstrap(&mut sched, rng);
        Peer::receive_reset(&alice, &mut sched, 7).unwrap();
        assert_eq!(alice.borrow().state(), State::SyncOk);
        Peer::receive_reset(&alice, &mut sched, 8).unwrap();
        assert_eq!(alice.borrow().n_remote(), 8);
        assert_eq!(alice.borrow().state(), State::SyncOk);
    }

    #[test]
    fn sending_before_peer_is_wired_returns_nil_peer() {
        let (mut sched, rng) = rig();
        let alice = make_peer(&mut sched, rng, "ALICE");
        // `Peer::set_peer` was never called, so the bootstrap reboot's
        // `master_start` fails to resolve a destination for its first Reset.
        let err = Peer::fire_reboot_finished(&alice, &mut sched).unwrap_err();
        assert!(matches!(err, Error::NilPeer));
    }

    #[test]
    fn starting_timer_twice_returns_timer_already_pending() {
        let (mut sched, rng) = rig();
        let alice = solo_peer_past_bootstrap(&mut sched, rng);
        // solo_peer_past_bootstrap already drove master_start, which leaves a
        // retransmit timer armed for SYNC_INIT.
        let err = Peer::start_timer(&alice, &mut sched).unwrap_err();
        assert!(matches!(err, Error::TimerAlreadyPending));
    }

    #[test]
    fn reboot_resets_fsm_fields_but_preserves_counters() {
        let (mut sched, rng) = rig();
        let (alice, bob) = wire_pair(&mut sched, rng);
        sched.run_count(200).unwrap();
        assert!(alice.borrow().is_data_ready());
        let sent_before = alice.borrow().stats().reset_sent;

        Peer::reboot_after(&alice, &mut sched, 0.0, 0.0, false);
        sched.run_count(4).unwrap();

        assert_eq!(alice.borrow().stats().reboots, 1);
        assert!(alice.borrow().stats().reset_sent >= sent_before);
        let _ = bob;
    }
}
