// Capability traits between the swerve core and whatever drives the wheels.
//
// The core never talks to a bus directly. A module gets one angle sensor and two
// motor outputs; which servo, ADC or simulated axis sits behind them is decided
// when the drive is wired up.

/// Tick resolution of the steer encoders used by default (one mechanical turn).
pub const DEFAULT_COUNTS_PER_REV: f64 = 4096.0;

/// Full-scale span of an absolute analog steering sensor.
pub const DEFAULT_FULL_SCALE_VOLTS: f64 = 5.0;

/// Actuator sink. Values are always in [-1, 1]; scaling, current limits and
/// safety cutoffs belong to the implementation.
pub trait MotorOutput {
    fn set(&mut self, value: f64);
}

/// Raw position counter (e.g. a servo's present-position register).
pub trait TickSource {
    fn read_ticks(&mut self) -> i32;
}

/// Raw voltage of an absolute analog encoder.
pub trait VoltageSource {
    fn read_volts(&mut self) -> f64;
}

/// Steering angle sensor in its own native units.
///
/// `full_scale` is the native span of one full revolution; the steering PID wraps
/// its error over `[0, full_scale)`.
pub trait AngleSensor {
    fn full_scale(&self) -> f64;
    fn position_native(&mut self) -> f64;
}

/// Angle sensor backed by an integrated position counter.
pub struct TickEncoder<S> {
    source: S,
    counts_per_rev: f64,
}

impl<S: TickSource> TickEncoder<S> {
    pub fn new(source: S, counts_per_rev: f64) -> Self {
        Self {
            source,
            counts_per_rev,
        }
    }
}

impl<S: TickSource> AngleSensor for TickEncoder<S> {
    fn full_scale(&self) -> f64 {
        self.counts_per_rev
    }

    fn position_native(&mut self) -> f64 {
        self.source.read_ticks() as f64
    }
}

/// Angle sensor backed by an absolute analog encoder over a fixed voltage span.
pub struct AnalogEncoder<S> {
    source: S,
    full_scale_volts: f64,
}

impl<S: VoltageSource> AnalogEncoder<S> {
    pub fn new(source: S, full_scale_volts: f64) -> Self {
        Self {
            source,
            full_scale_volts,
        }
    }
}

impl<S: VoltageSource> AngleSensor for AnalogEncoder<S> {
    fn full_scale(&self) -> f64 {
        self.full_scale_volts
    }

    fn position_native(&mut self) -> f64 {
        self.source.read_volts()
    }
}

/// Native sensor units to degrees.
pub fn native_to_degrees(native: f64, full_scale: f64) -> f64 {
    native / full_scale * 360.0
}

/// Degrees to native sensor units. Exact inverse of [`native_to_degrees`].
pub fn degrees_to_native(degrees: f64, full_scale: f64) -> f64 {
    degrees / 360.0 * full_scale
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedTicks(i32);

    impl TickSource for FixedTicks {
        fn read_ticks(&mut self) -> i32 {
            self.0
        }
    }

    struct FixedVolts(f64);

    impl VoltageSource for FixedVolts {
        fn read_volts(&mut self) -> f64 {
            self.0
        }
    }

    #[test]
    fn test_round_trip_within_resolution() {
        for full_scale in [DEFAULT_COUNTS_PER_REV, DEFAULT_FULL_SCALE_VOLTS] {
            let resolution_deg = 360.0 / full_scale;
            let mut deg = 0.0;
            while deg < 360.0 {
                let back = native_to_degrees(degrees_to_native(deg, full_scale), full_scale);
                assert!(
                    (back - deg).abs() <= resolution_deg,
                    "{} -> {} (full scale {})",
                    deg,
                    back,
                    full_scale
                );
                deg += 0.37;
            }
        }
    }

    #[test]
    fn test_quarter_turns() {
        assert_eq!(degrees_to_native(90.0, 4096.0), 1024.0);
        assert_eq!(native_to_degrees(2048.0, 4096.0), 180.0);
        assert_eq!(degrees_to_native(270.0, 5.0), 3.75);
    }

    #[test]
    fn test_both_encodings_share_the_interface() {
        let mut sensors: Vec<Box<dyn AngleSensor>> = vec![
            Box::new(TickEncoder::new(FixedTicks(1024), 4096.0)),
            Box::new(AnalogEncoder::new(FixedVolts(1.25), 5.0)),
        ];

        for sensor in sensors.iter_mut() {
            let full_scale = sensor.full_scale();
            let deg = native_to_degrees(sensor.position_native(), full_scale);
            assert!((deg - 90.0).abs() < 1e-9);
        }
    }
}
