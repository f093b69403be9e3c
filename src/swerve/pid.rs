// Steering PID with continuous-input wraparound.
//
// The controller runs in the sensor's native units (ticks or volts). With
// continuous input enabled over [0, full_scale) the error always takes the short
// way around, so 4090 -> 10 ticks is an error of +16, not -4080.

/// Default integrator clamp, expressed as the maximum contribution of the I term.
const INTEGRATOR_LIMIT: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct PidController {
    kp: f64,
    ki: f64,
    kd: f64,
    period: f64,
    continuous: Option<(f64, f64)>,
    position_tolerance: f64,
    velocity_tolerance: f64,

    total_error: f64,
    prev_error: Option<f64>,
    position_error: f64,
    velocity_error: f64,
}

impl PidController {
    /// `period` is the control cycle in seconds and scales the I and D terms.
    pub fn new(kp: f64, ki: f64, kd: f64, period: f64) -> Self {
        Self {
            kp,
            ki,
            kd,
            period,
            continuous: None,
            position_tolerance: 0.05,
            velocity_tolerance: f64::INFINITY,
            total_error: 0.0,
            prev_error: None,
            position_error: 0.0,
            velocity_error: 0.0,
        }
    }

    /// Treat `min` and `max` as the same point (e.g. 0 and 4096 ticks).
    pub fn enable_continuous_input(&mut self, min: f64, max: f64) {
        self.continuous = Some((min, max));
    }

    pub fn set_tolerance(&mut self, position: f64, velocity: f64) {
        self.position_tolerance = position;
        self.velocity_tolerance = velocity;
    }

    /// Run one step and return the raw (unclamped) output.
    pub fn calculate(&mut self, measurement: f64, setpoint: f64) -> f64 {
        let error = match self.continuous {
            Some((min, max)) => {
                let half = (max - min) / 2.0;
                input_modulus(setpoint - measurement, -half, half)
            }
            None => setpoint - measurement,
        };

        self.velocity_error = match self.prev_error {
            Some(prev) => (error - prev) / self.period,
            None => 0.0,
        };

        if self.ki != 0.0 {
            let limit = INTEGRATOR_LIMIT / self.ki.abs();
            self.total_error = (self.total_error + error * self.period).clamp(-limit, limit);
        }

        self.prev_error = Some(error);
        self.position_error = error;

        self.kp * error + self.ki * self.total_error + self.kd * self.velocity_error
    }

    /// True once a measurement has been taken and both the position and velocity
    /// errors sit inside their tolerances.
    pub fn at_setpoint(&self) -> bool {
        self.prev_error.is_some()
            && self.position_error.abs() < self.position_tolerance
            && self.velocity_error.abs() < self.velocity_tolerance
    }

    /// Clear the integrator and error history.
    pub fn reset(&mut self) {
        self.total_error = 0.0;
        self.prev_error = None;
        self.position_error = 0.0;
        self.velocity_error = 0.0;
    }

    pub fn position_error(&self) -> f64 {
        self.position_error
    }
}

/// Wrap `input` into `[min, max)`.
pub fn input_modulus(input: f64, min: f64, max: f64) -> f64 {
    let modulus = max - min;
    min + (input - min).rem_euclid(modulus)
}
