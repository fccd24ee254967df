//! Controlled pendulum: integrate with the plain form, then sample records.
//!
//! Run with `RUST_LOG=debug` to see the driver's tracing output.

use steplog_core::{loggable, sample_with_config, RecordError, SamplingConfig};

const GRAVITY: f64 = 9.81;

struct Controller {
    kp: f64,
    kd: f64,
    limit: f64,
}

impl Controller {
    #[loggable]
    fn torque(&self, theta: f64, omega: f64) -> f64 {
        log!(demand = -self.kp * theta - self.kd * omega);
        log!(saturated = demand.abs() > self.limit);
        demand.clamp(-self.limit, self.limit)
    }
}

#[loggable]
fn dynamics(controller: &Controller, length: f64, state: (f64, f64)) -> (f64, f64) {
    let (theta, omega) = state;
    let u = nested_log!(controller: controller.torque(theta, omega));
    log!(alpha = -(GRAVITY / length) * theta.sin() + u);
    only_log!(energy = 0.5 * length * length * omega * omega + GRAVITY * length * (1.0 - theta.cos()));
    (omega, alpha)
}

fn main() -> Result<(), RecordError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let controller = Controller {
        kp: 12.0,
        kd: 3.0,
        limit: 4.0,
    };
    let length = 1.0;
    let dt = 1.0e-3;

    // Forward Euler with the plain form: nothing is recorded here
    let mut states = vec![(0.0, (0.6, 0.0))];
    let (mut t, mut state) = (0.0, (0.6, 0.0));
    while t < 2.0 {
        let (dtheta, domega) = dynamics(&controller, length, state);
        state = (state.0 + dt * dtheta, state.1 + dt * domega);
        t += dt;
        states.push((t, state));
    }

    // Re-run the step at checkpoints in recording mode
    let config = SamplingConfig::uniform(0.0, 2.0, 9)?.with_label("pendulum");
    let trajectory = sample_with_config(&config, |t, ctx| {
        let index = states.partition_point(|(time, _)| time < t);
        let (_, state) = states[index.min(states.len() - 1)];
        dynamics_with_context(&controller, length, state, ctx)
    })?;

    let torques = trajectory.series_f64("controller.demand")?;
    for (sample, torque) in trajectory.iter().zip(torques) {
        println!(
            "t = {:4.2}  torque = {torque:+8.4}  record = {}",
            sample.point, sample.record
        );
    }
    println!("{}", serde_json::to_string_pretty(&trajectory)?);
    Ok(())
}
