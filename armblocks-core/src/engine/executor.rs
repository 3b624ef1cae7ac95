//! Block execution engine
//!
//! Walks a program depth-first, one block at a time, awaiting every
//! actuator call before moving on. Cancellation is checked before each block
//! and raced against every delay. Connection loss ends the run; any other
//! actuator failure is logged, counted and skipped.

use core::cell::Cell;
use core::fmt;

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embedded_hal_async::delay::DelayNs;
use log::{debug, error, info, warn};

use super::cancel::CancelToken;
use super::state::{RunEvent, RunState};
use crate::config::DEFAULT_SETTLE_MS;
use crate::program::{Block, BlockKind, Program};
use crate::traits::{Actuator, ActuatorError};

/// Engine settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Pause between top-level blocks (ms)
    pub settle_ms: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            settle_ms: DEFAULT_SETTLE_MS,
        }
    }
}

/// Counters from the most recent run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunReport {
    /// Blocks started, at every depth and counting each repetition
    pub blocks_executed: u32,
    /// Actuator failures logged and skipped
    pub absorbed_failures: u32,
}

/// Why a run did not complete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunError {
    /// Another run is active on this engine
    AlreadyRunning,
    /// Cancelled by the caller
    Aborted,
    /// The actuator lost its link; reconnect before retrying
    ConnectionLost,
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::AlreadyRunning => write!(f, "a run is already active"),
            RunError::Aborted => write!(f, "execution aborted"),
            RunError::ConnectionLost => write!(f, "connection lost"),
        }
    }
}

/// Reason execution stopped early
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Halt {
    Cancelled,
    LinkLost,
}

impl From<Halt> for RunError {
    fn from(halt: Halt) -> Self {
        match halt {
            Halt::Cancelled => RunError::Aborted,
            Halt::LinkLost => RunError::ConnectionLost,
        }
    }
}

/// Position inside one block sequence
struct Frame<'p> {
    blocks: &'p [Block],
    index: usize,
    /// Passes over `blocks` still to run, including the current one
    passes_left: u32,
}

impl<'p> Frame<'p> {
    fn new(blocks: &'p [Block], passes: u32) -> Self {
        Self {
            blocks,
            index: 0,
            passes_left: passes,
        }
    }
}

/// Sequential block interpreter
pub struct Engine {
    config: EngineConfig,
    state: Mutex<CriticalSectionRawMutex, Cell<RunState>>,
    report: Mutex<CriticalSectionRawMutex, Cell<RunReport>>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            state: Mutex::new(Cell::new(RunState::Idle)),
            report: Mutex::new(Cell::new(RunReport::default())),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current run state
    pub fn state(&self) -> RunState {
        self.state.lock(|state| state.get())
    }

    /// Counters of the current or last run
    pub fn report(&self) -> RunReport {
        self.report.lock(|report| report.get())
    }

    /// Execute a program to completion, cancellation or connection loss
    ///
    /// Only one run may be active at a time. Dropping the returned future
    /// mid-run leaves the engine in [`RunState::Aborted`].
    pub async fn run<A: Actuator, D: DelayNs>(
        &self,
        program: &Program,
        actuator: &A,
        delay: &mut D,
        cancel: &CancelToken,
    ) -> Result<(), RunError> {
        let guard = RunGuard::start(self)?;
        info!("Run started: {} blocks", program.block_count());

        let result = self.execute(program, actuator, delay, cancel).await;
        let report = self.report();
        match result {
            Ok(()) => info!(
                "Run completed: {} blocks, {} absorbed failures",
                report.blocks_executed, report.absorbed_failures
            ),
            Err(Halt::Cancelled) => info!("Run aborted after {} blocks", report.blocks_executed),
            Err(Halt::LinkLost) => error!("Run failed: connection lost"),
        }

        guard.finish(match result {
            Ok(()) => RunEvent::Finish,
            Err(Halt::Cancelled) => RunEvent::Cancel,
            Err(Halt::LinkLost) => RunEvent::LinkLost,
        });
        result.map_err(RunError::from)
    }

    async fn execute<A: Actuator, D: DelayNs>(
        &self,
        program: &Program,
        actuator: &A,
        delay: &mut D,
        cancel: &CancelToken,
    ) -> Result<(), Halt> {
        for (index, root) in program.blocks.iter().enumerate() {
            if index > 0 {
                self.pause(self.config.settle_ms, delay, cancel).await?;
            }
            self.execute_root(root, actuator, delay, cancel).await?;
        }
        Ok(())
    }

    /// Run one top-level block and everything beneath it
    async fn execute_root<A: Actuator, D: DelayNs>(
        &self,
        root: &Block,
        actuator: &A,
        delay: &mut D,
        cancel: &CancelToken,
    ) -> Result<(), Halt> {
        let mut stack = vec![Frame::new(core::slice::from_ref(root), 1)];

        while let Some(frame) = stack.last_mut() {
            if frame.index == frame.blocks.len() {
                frame.passes_left -= 1;
                if frame.passes_left == 0 {
                    stack.pop();
                } else {
                    frame.index = 0;
                }
                continue;
            }

            let blocks = frame.blocks;
            let block = &blocks[frame.index];
            frame.index += 1;

            checkpoint(cancel)?;
            self.update_report(|report| report.blocks_executed += 1);
            debug!("Block {} ({})", block.id, block.kind.name());

            match &block.kind {
                BlockKind::Repeat { times, body } => {
                    if *times > 0 && !body.is_empty() {
                        stack.push(Frame::new(body, *times));
                    }
                }
                BlockKind::If { condition, body } | BlockKind::While { condition, body } => {
                    if *condition && !body.is_empty() {
                        stack.push(Frame::new(body, 1));
                    }
                }
                BlockKind::Wait { millis } => self.pause(*millis, delay, cancel).await?,
                BlockKind::Move { targets } => {
                    self.absorb(block, actuator.update_joints_degrees(targets).await)?
                }
                BlockKind::Home => self.absorb(block, actuator.home_robot().await)?,
                BlockKind::OpenGripper => self.absorb(block, actuator.open_gripper().await)?,
                BlockKind::CloseGripper => self.absorb(block, actuator.close_gripper().await)?,
            }
        }
        Ok(())
    }

    /// Halt on connection loss, count and skip any other actuator failure
    fn absorb(&self, block: &Block, result: Result<(), ActuatorError>) -> Result<(), Halt> {
        match result {
            Ok(()) => Ok(()),
            Err(err) if err.is_fatal() => {
                error!("Block {} ({}): {}", block.id, block.kind.name(), err);
                Err(Halt::LinkLost)
            }
            Err(err) => {
                warn!("Block {} ({}): {}", block.id, block.kind.name(), err);
                self.update_report(|report| report.absorbed_failures += 1);
                Ok(())
            }
        }
    }

    /// Cancellable delay
    async fn pause<D: DelayNs>(
        &self,
        millis: u32,
        delay: &mut D,
        cancel: &CancelToken,
    ) -> Result<(), Halt> {
        checkpoint(cancel)?;
        if millis == 0 {
            return Ok(());
        }
        match select(delay.delay_ms(millis), cancel.cancelled()).await {
            Either::First(()) => Ok(()),
            Either::Second(()) => Err(Halt::Cancelled),
        }
    }

    fn update_report(&self, f: impl FnOnce(&mut RunReport)) {
        self.report.lock(|cell| {
            let mut report = cell.get();
            f(&mut report);
            cell.set(report);
        });
    }

    fn apply(&self, event: RunEvent) -> RunState {
        self.state.lock(|state| {
            let next = state.get().transition(event);
            state.set(next);
            next
        })
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

fn checkpoint(cancel: &CancelToken) -> Result<(), Halt> {
    if cancel.is_cancelled() {
        return Err(Halt::Cancelled);
    }
    Ok(())
}

/// Marks the engine running; records `Aborted` if dropped unfinished
struct RunGuard<'e> {
    engine: &'e Engine,
    finished: bool,
}

impl<'e> RunGuard<'e> {
    fn start(engine: &'e Engine) -> Result<Self, RunError> {
        let started = engine.state.lock(|state| {
            let current = state.get();
            if current.is_running() {
                return false;
            }
            state.set(current.transition(RunEvent::Start));
            true
        });
        if !started {
            warn!("Run rejected: already running");
            return Err(RunError::AlreadyRunning);
        }

        engine.report.lock(|report| report.set(RunReport::default()));
        Ok(Self {
            engine,
            finished: false,
        })
    }

    fn finish(mut self, event: RunEvent) {
        self.engine.apply(event);
        self.finished = true;
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            warn!("Run dropped while active");
            self.engine.apply(RunEvent::Cancel);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::state::FailReason;
    use crate::traits::{BusError, JointTarget, Refusal};
    use core::cell::RefCell;
    use embassy_futures::join::join;
    use embassy_futures::{block_on, poll_once, yield_now};

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Update(Vec<JointTarget>),
        Home,
        Open,
        Close,
        Delay(u32),
    }

    struct RecordingActuator<'a> {
        calls: &'a RefCell<Vec<Call>>,
        made: Cell<usize>,
        fail_at: Option<(usize, ActuatorError)>,
        cancel_at: Option<(usize, &'a CancelToken)>,
    }

    impl<'a> RecordingActuator<'a> {
        fn new(calls: &'a RefCell<Vec<Call>>) -> Self {
            Self {
                calls,
                made: Cell::new(0),
                fail_at: None,
                cancel_at: None,
            }
        }

        fn record(&self, call: Call) -> Result<(), ActuatorError> {
            let n = self.made.get();
            self.made.set(n + 1);
            self.calls.borrow_mut().push(call);

            if let Some((at, token)) = self.cancel_at {
                if at == n {
                    token.cancel();
                }
            }
            match self.fail_at {
                Some((at, err)) if at == n => Err(err),
                _ => Ok(()),
            }
        }
    }

    impl Actuator for RecordingActuator<'_> {
        async fn connect(&self) -> Result<(), ActuatorError> {
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), ActuatorError> {
            Ok(())
        }

        async fn home_robot(&self) -> Result<(), ActuatorError> {
            self.record(Call::Home)
        }

        async fn open_gripper(&self) -> Result<(), ActuatorError> {
            self.record(Call::Open)
        }

        async fn close_gripper(&self) -> Result<(), ActuatorError> {
            self.record(Call::Close)
        }

        async fn update_joints_degrees(&self, targets: &[JointTarget]) -> Result<(), ActuatorError> {
            self.record(Call::Update(targets.to_vec()))
        }
    }

    struct RecordingDelay<'a> {
        calls: &'a RefCell<Vec<Call>>,
    }

    impl DelayNs for RecordingDelay<'_> {
        async fn delay_ns(&mut self, _ns: u32) {}

        async fn delay_ms(&mut self, ms: u32) {
            self.calls.borrow_mut().push(Call::Delay(ms));
        }
    }

    /// Delay that never completes
    struct StuckDelay;

    impl DelayNs for StuckDelay {
        async fn delay_ns(&mut self, _ns: u32) {
            core::future::pending::<()>().await
        }

        async fn delay_ms(&mut self, _ms: u32) {
            core::future::pending::<()>().await
        }
    }

    fn engine(settle_ms: u32) -> Engine {
        Engine::new(EngineConfig { settle_ms })
    }

    fn moves(n: u8) -> Program {
        Program::new(
            (1..=n)
                .map(|i| Block::move_joint(format!("m{}", i), i, 10.0 * i as f32))
                .collect(),
        )
    }

    fn update(servo_id: u8, degrees: f32) -> Call {
        Call::Update(vec![JointTarget::new(servo_id, degrees)])
    }

    #[test]
    fn test_move_wait_open_scenario() {
        let calls = RefCell::new(Vec::new());
        let actuator = RecordingActuator::new(&calls);
        let mut delay = RecordingDelay { calls: &calls };
        let cancel = CancelToken::new();
        let engine = engine(500);

        let program = Program::new(vec![
            Block::move_joint("b1", 1, 180.0),
            Block::wait("b2", 1000),
            Block::new("b3", BlockKind::OpenGripper),
        ]);

        block_on(engine.run(&program, &actuator, &mut delay, &cancel)).unwrap();

        assert_eq!(
            *calls.borrow(),
            vec![
                update(1, 180.0),
                Call::Delay(500),
                Call::Delay(1000),
                Call::Delay(500),
                Call::Open,
            ]
        );
        assert_eq!(engine.state(), RunState::Completed);
        assert_eq!(engine.report().blocks_executed, 3);
    }

    #[test]
    fn test_leaves_in_order() {
        let calls = RefCell::new(Vec::new());
        let actuator = RecordingActuator::new(&calls);
        let mut delay = RecordingDelay { calls: &calls };
        let engine = engine(0);

        block_on(engine.run(&moves(4), &actuator, &mut delay, &CancelToken::new())).unwrap();

        assert_eq!(
            *calls.borrow(),
            vec![update(1, 10.0), update(2, 20.0), update(3, 30.0), update(4, 40.0)]
        );
    }

    #[test]
    fn test_repeat_preserves_sibling_order() {
        let calls = RefCell::new(Vec::new());
        let actuator = RecordingActuator::new(&calls);
        let mut delay = RecordingDelay { calls: &calls };
        let engine = engine(0);

        let program = Program::new(vec![
            Block::new("h1", BlockKind::Home),
            Block::repeat(
                "r",
                3,
                vec![
                    Block::new("o", BlockKind::OpenGripper),
                    Block::new("c", BlockKind::CloseGripper),
                ],
            ),
            Block::new("h2", BlockKind::Home),
        ]);

        block_on(engine.run(&program, &actuator, &mut delay, &CancelToken::new())).unwrap();

        let mut expected = vec![Call::Home];
        for _ in 0..3 {
            expected.push(Call::Open);
            expected.push(Call::Close);
        }
        expected.push(Call::Home);
        assert_eq!(*calls.borrow(), expected);
        assert_eq!(engine.report().blocks_executed, 9);
    }

    #[test]
    fn test_nested_repeat_settles_only_at_top_level() {
        let calls = RefCell::new(Vec::new());
        let actuator = RecordingActuator::new(&calls);
        let mut delay = RecordingDelay { calls: &calls };
        let engine = engine(500);

        let program = Program::new(vec![
            Block::repeat(
                "outer",
                2,
                vec![Block::repeat("inner", 2, vec![Block::new("o", BlockKind::OpenGripper)])],
            ),
            Block::new("h", BlockKind::Home),
        ]);

        block_on(engine.run(&program, &actuator, &mut delay, &CancelToken::new())).unwrap();

        assert_eq!(
            *calls.borrow(),
            vec![
                Call::Open,
                Call::Open,
                Call::Open,
                Call::Open,
                Call::Delay(500),
                Call::Home
            ]
        );
    }

    #[test]
    fn test_conditionals() {
        let calls = RefCell::new(Vec::new());
        let actuator = RecordingActuator::new(&calls);
        let mut delay = RecordingDelay { calls: &calls };
        let engine = engine(0);

        let body = || vec![Block::new("o", BlockKind::OpenGripper)];
        let program = Program::new(vec![
            Block::new("i1", BlockKind::If { condition: false, body: body() }),
            Block::new("i2", BlockKind::If { condition: true, body: body() }),
            Block::new("w1", BlockKind::While { condition: true, body: body() }),
            Block::new("w2", BlockKind::While { condition: false, body: body() }),
            Block::repeat("r0", 0, body()),
        ]);

        block_on(engine.run(&program, &actuator, &mut delay, &CancelToken::new())).unwrap();

        assert_eq!(*calls.borrow(), vec![Call::Open, Call::Open]);
    }

    #[test]
    fn test_cancel_during_block_skips_rest() {
        let calls = RefCell::new(Vec::new());
        let cancel = CancelToken::new();
        let mut actuator = RecordingActuator::new(&calls);
        actuator.cancel_at = Some((1, &cancel));
        let mut delay = RecordingDelay { calls: &calls };
        let engine = engine(500);

        let result = block_on(engine.run(&moves(3), &actuator, &mut delay, &cancel));

        assert_eq!(result, Err(RunError::Aborted));
        assert_eq!(engine.state(), RunState::Aborted);
        assert_eq!(
            *calls.borrow(),
            vec![update(1, 10.0), Call::Delay(500), update(2, 20.0)]
        );
    }

    #[test]
    fn test_cancel_inside_repeat() {
        let calls = RefCell::new(Vec::new());
        let cancel = CancelToken::new();
        let mut actuator = RecordingActuator::new(&calls);
        actuator.cancel_at = Some((2, &cancel));
        let mut delay = RecordingDelay { calls: &calls };
        let engine = engine(0);

        let program = Program::new(vec![Block::repeat(
            "r",
            10,
            vec![Block::new("o", BlockKind::OpenGripper)],
        )]);
        let result = block_on(engine.run(&program, &actuator, &mut delay, &cancel));

        assert_eq!(result, Err(RunError::Aborted));
        assert_eq!(calls.borrow().len(), 3);
    }

    #[test]
    fn test_cancel_before_start() {
        let calls = RefCell::new(Vec::new());
        let actuator = RecordingActuator::new(&calls);
        let mut delay = RecordingDelay { calls: &calls };
        let cancel = CancelToken::new();
        cancel.cancel();
        let engine = engine(0);

        let result = block_on(engine.run(&moves(2), &actuator, &mut delay, &cancel));

        assert_eq!(result, Err(RunError::Aborted));
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn test_cancel_during_wait() {
        let calls = RefCell::new(Vec::new());
        let actuator = RecordingActuator::new(&calls);
        let cancel = CancelToken::new();
        let engine = engine(0);

        let program = Program::new(vec![
            Block::wait("w", 60_000),
            Block::new("o", BlockKind::OpenGripper),
        ]);

        let (result, ()) = block_on(join(
            async {
                let mut delay = StuckDelay;
                engine.run(&program, &actuator, &mut delay, &cancel).await
            },
            async {
                yield_now().await;
                cancel.cancel();
            },
        ));

        assert_eq!(result, Err(RunError::Aborted));
        assert!(calls.borrow().is_empty());
        assert_eq!(engine.state(), RunState::Aborted);
    }

    #[test]
    fn test_connection_loss_stops_run() {
        let calls = RefCell::new(Vec::new());
        let mut actuator = RecordingActuator::new(&calls);
        actuator.fail_at = Some((1, ActuatorError::ConnectionLost));
        let mut delay = RecordingDelay { calls: &calls };
        let engine = engine(0);

        let result = block_on(engine.run(&moves(3), &actuator, &mut delay, &CancelToken::new()));

        assert_eq!(result, Err(RunError::ConnectionLost));
        assert_eq!(engine.state(), RunState::Failed(FailReason::ConnectionLost));
        assert_eq!(*calls.borrow(), vec![update(1, 10.0), update(2, 20.0)]);
    }

    #[test]
    fn test_write_failure_absorbed() {
        let calls = RefCell::new(Vec::new());
        let mut actuator = RecordingActuator::new(&calls);
        actuator.fail_at = Some((0, ActuatorError::WriteFailed(BusError::Timeout { servo_id: 1 })));
        let mut delay = RecordingDelay { calls: &calls };
        let engine = engine(0);

        block_on(engine.run(&moves(3), &actuator, &mut delay, &CancelToken::new())).unwrap();

        assert_eq!(calls.borrow().len(), 3);
        assert_eq!(engine.state(), RunState::Completed);
        assert_eq!(
            engine.report(),
            RunReport {
                blocks_executed: 3,
                absorbed_failures: 1
            }
        );
    }

    #[test]
    fn test_every_actuator_leaf_dispatched() {
        let calls = RefCell::new(Vec::new());
        let mut actuator = RecordingActuator::new(&calls);
        actuator.fail_at = Some((1, ActuatorError::Refused(Refusal::NotConnected)));
        let mut delay = RecordingDelay { calls: &calls };
        let engine = engine(0);

        let program = Program::new(vec![
            Block::move_joint("m", 2, 45.0),
            Block::new("h", BlockKind::Home),
            Block::new("o", BlockKind::OpenGripper),
            Block::new("c", BlockKind::CloseGripper),
        ]);
        block_on(engine.run(&program, &actuator, &mut delay, &CancelToken::new())).unwrap();

        assert_eq!(
            *calls.borrow(),
            vec![update(2, 45.0), Call::Home, Call::Open, Call::Close]
        );
        assert_eq!(engine.report().absorbed_failures, 1);
    }

    #[test]
    fn test_second_run_rejected() {
        let calls = RefCell::new(Vec::new());
        let actuator = RecordingActuator::new(&calls);
        let cancel = CancelToken::new();
        let engine = engine(0);
        let program = Program::new(vec![Block::wait("w", 1000)]);

        let (first, ()) = block_on(join(
            async {
                let mut delay = StuckDelay;
                engine.run(&program, &actuator, &mut delay, &cancel).await
            },
            async {
                let mut delay = RecordingDelay { calls: &calls };
                let second = engine
                    .run(&program, &actuator, &mut delay, &CancelToken::new())
                    .await;
                assert_eq!(second, Err(RunError::AlreadyRunning));
                assert!(engine.state().is_running());
                cancel.cancel();
            },
        ));

        assert_eq!(first, Err(RunError::Aborted));
        assert_eq!(engine.state(), RunState::Aborted);
    }

    #[test]
    fn test_dropped_run_records_abort() {
        let calls = RefCell::new(Vec::new());
        let actuator = RecordingActuator::new(&calls);
        let cancel = CancelToken::new();
        let engine = engine(0);
        let program = Program::new(vec![Block::wait("w", 1000)]);

        let mut delay = StuckDelay;
        assert!(poll_once(engine.run(&program, &actuator, &mut delay, &cancel)).is_pending());
        assert_eq!(engine.state(), RunState::Aborted);

        // A fresh run starts over
        let mut delay = RecordingDelay { calls: &calls };
        block_on(engine.run(&program, &actuator, &mut delay, &cancel)).unwrap();
        assert_eq!(engine.state(), RunState::Completed);
    }
}
