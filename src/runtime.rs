// Drive loop and process lifecycle
//
// The drive loop runs on its own blocking thread with no delay between
// cycles: bounds guard, then any pending velocity write, then the terminate
// check. Keyboard and UDP sources mutate the shared state from their own
// contexts through the command arbiter.

use std::error::Error;
use std::future::Future;
use std::pin::Pin;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::control::{lock, shared, BoundsGuard, CommandArbiter, ControlState, GuardPhase, SharedState};
use crate::keyboard::KeyboardInput;
use crate::motor::{tolerate, Actuator, AxisId, DynamixelError, PanTiltDriver};
use crate::network::{Listener, NetworkClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Continue,
    Terminate,
}

pub struct DriveLoop<A: Actuator> {
    actuator: A,
    state: SharedState,
    guard: BoundsGuard,
    cycle_yield: Duration,
}

impl<A: Actuator> DriveLoop<A> {
    pub fn new(actuator: A, state: SharedState, config: &Config) -> Self {
        Self {
            actuator,
            state,
            guard: BoundsGuard::new(config),
            cycle_yield: config.cycle_yield(),
        }
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn guard(&self) -> &BoundsGuard {
        &self.guard
    }

    fn write_velocity(&mut self, axis: AxisId, velocity: i32) -> Result<(), DynamixelError> {
        tolerate(self.actuator.set_velocity(axis, velocity), axis, "velocity write")?;
        Ok(())
    }

    /// One iteration of the loop
    pub fn cycle(&mut self, now: Instant) -> Result<CycleOutcome, DynamixelError> {
        let phase = self.guard.step(now, &mut self.actuator, &self.state)?;

        // Pending commands wait while a recovery is holding
        if phase == GuardPhase::Monitoring {
            let pending = lock(&self.state).take_pending();
            if let Some((horizontal, vertical)) = pending {
                debug!("Writing velocities H={}, V={}", horizontal, vertical);
                self.write_velocity(AxisId::Pan, horizontal)?;
                self.write_velocity(AxisId::Tilt, vertical)?;
            }
        }

        if lock(&self.state).terminate_requested() {
            return Ok(CycleOutcome::Terminate);
        }
        Ok(CycleOutcome::Continue)
    }

    /// Run until terminate or an unrecoverable actuator error, handing the actuator back
    pub fn run(mut self) -> (A, Result<(), DynamixelError>) {
        info!("Drive loop started");

        // Start from a standstill; the first cycle writes it out
        lock(&self.state).zero_velocities();

        let result = loop {
            match self.cycle(Instant::now()) {
                Ok(CycleOutcome::Continue) => {}
                Ok(CycleOutcome::Terminate) => {
                    info!("Exiting drive loop");
                    break Ok(());
                }
                Err(e) => {
                    error!("Actuator failure, stopping drive loop: {}", e);
                    break Err(e);
                }
            }
            if !self.cycle_yield.is_zero() {
                thread::sleep(self.cycle_yield);
            }
        };

        (self.actuator, result)
    }
}

pub async fn run(config: Config) -> Result<(), Box<dyn Error + Send + Sync>> {
    let mut driver = PanTiltDriver::open(&config)?;
    if let Err(e) = driver.initialize() {
        error!("Motor initialization failed: {}", e);
        driver.close();
        return Err(e.into());
    }

    let state = shared(ControlState::new());
    let arbiter = CommandArbiter::new(state.clone(), &config);

    let network = if config.network.enabled {
        match NetworkClient::connect(&config.network).await {
            Ok(client) => {
                let listener = client.spawn_listener(arbiter.clone(), config.network.listen_interval());
                Some((client, listener))
            }
            Err(e) => {
                warn!("Command server unavailable ({}), proceeding with keyboard control only", e);
                None
            }
        }
    } else {
        None
    };

    let keyboard = if config.keyboard_enabled {
        match KeyboardInput::spawn(arbiter.clone()) {
            Ok(keyboard) => Some(keyboard),
            Err(e) => {
                warn!("Keyboard unavailable: {}", e);
                None
            }
        }
    } else {
        None
    };

    let interrupt_state = state.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted");
            lock(&interrupt_state).request_terminate();
        }
    });

    let drive = DriveLoop::new(driver, state.clone(), &config);
    let outcome = tokio::task::spawn_blocking(move || drive.run()).await;

    // Make sure every source winds down, whatever ended the loop
    lock(&state).request_terminate();
    interrupt.abort();

    let (driver, result): (Option<PanTiltDriver>, Result<(), Box<dyn Error + Send + Sync>>) =
        match outcome {
            Ok((driver, result)) => (Some(driver), result.map_err(Into::into)),
            Err(e) => {
                // The driver was dropped while unwinding, which releases torque
                error!("Drive loop panicked: {}", e);
                (None, Err(e.into()))
            }
        };

    shutdown(teardown_steps(network, keyboard, driver)).await;
    result
}

type StepResult = Result<(), Box<dyn Error + Send + Sync>>;

/// One named stage of the shutdown sequence
pub struct ShutdownStep {
    name: &'static str,
    action: Pin<Box<dyn Future<Output = StepResult> + Send>>,
}

impl ShutdownStep {
    pub fn new(name: &'static str, action: impl Future<Output = StepResult> + Send + 'static) -> Self {
        Self {
            name,
            action: Box::pin(action),
        }
    }
}

/// Listener, then socket, then terminal, then motors
fn teardown_steps(
    network: Option<(NetworkClient, Listener)>,
    keyboard: Option<KeyboardInput>,
    driver: Option<PanTiltDriver>,
) -> Vec<ShutdownStep> {
    let mut steps = Vec::new();

    if let Some((client, listener)) = network {
        steps.push(ShutdownStep::new("stop UDP listener", async move {
            listener.stop().await.map_err(Into::into)
        }));
        steps.push(ShutdownStep::new("close UDP client", async move {
            client.close();
            Ok(())
        }));
    }

    if let Some(keyboard) = keyboard {
        steps.push(ShutdownStep::new("restore terminal", async move {
            keyboard.stop().map_err(Into::into)
        }));
    }

    if let Some(driver) = driver {
        steps.push(release_motors(driver));
    }

    steps
}

/// Motors that hold torque until released
pub trait TorqueHolder: Send + 'static {
    /// Disable torque on every motor; false if any failed
    fn release(&mut self) -> bool;
    fn close(self);
}

impl TorqueHolder for PanTiltDriver {
    fn release(&mut self) -> bool {
        PanTiltDriver::release(self)
    }

    fn close(self) {
        PanTiltDriver::close(self)
    }
}

fn release_motors<T: TorqueHolder>(mut motors: T) -> ShutdownStep {
    ShutdownStep::new("release motors", async move {
        let released = motors.release();
        // The port is closed either way
        motors.close();
        if released {
            Ok(())
        } else {
            Err("torque release incomplete".into())
        }
    })
}

/// Run every step in order, even after a failure. Returns the number that failed.
async fn shutdown(steps: Vec<ShutdownStep>) -> usize {
    info!("Cleaning up...");

    let mut failed = 0;
    for step in steps {
        match step.action.await {
            Ok(()) => debug!("Shutdown: {} done", step.name),
            Err(e) => {
                error!("Shutdown: {} failed: {}", step.name, e);
                failed += 1;
            }
        }
    }
    failed
}
