// Swerve inverse kinematics for a four-wheel, independently steered base.
// Converts a robot-frame motion request (forward, strafe, rotate) into a speed and
// steering angle for every wheel.
//
// Conventions: forward positive ahead, strafe positive to the right, rotate
// positive clockwise. Wheel angles are measured clockwise from the forward axis.

use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

/// Wheel positions on the chassis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleId {
    FrontLeft,
    FrontRight,
    RearLeft,
    RearRight,
}

impl ModuleId {
    pub const ALL: [ModuleId; 4] = [
        ModuleId::FrontLeft,
        ModuleId::FrontRight,
        ModuleId::RearLeft,
        ModuleId::RearRight,
    ];

    pub fn is_front(self) -> bool {
        matches!(self, ModuleId::FrontLeft | ModuleId::FrontRight)
    }

    pub fn is_left(self) -> bool {
        matches!(self, ModuleId::FrontLeft | ModuleId::RearLeft)
    }
}

/// One value per wheel, addressed by [`ModuleId`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ModuleSet<T> {
    pub front_left: T,
    pub front_right: T,
    pub rear_left: T,
    pub rear_right: T,
}

impl<T> ModuleSet<T> {
    pub fn from_fn(mut f: impl FnMut(ModuleId) -> T) -> Self {
        Self {
            front_left: f(ModuleId::FrontLeft),
            front_right: f(ModuleId::FrontRight),
            rear_left: f(ModuleId::RearLeft),
            rear_right: f(ModuleId::RearRight),
        }
    }

    pub fn map<U>(self, mut f: impl FnMut(ModuleId, T) -> U) -> ModuleSet<U> {
        ModuleSet {
            front_left: f(ModuleId::FrontLeft, self.front_left),
            front_right: f(ModuleId::FrontRight, self.front_right),
            rear_left: f(ModuleId::RearLeft, self.rear_left),
            rear_right: f(ModuleId::RearRight, self.rear_right),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ModuleId, &T)> {
        ModuleId::ALL.into_iter().map(move |id| (id, &self[id]))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ModuleId, &mut T)> {
        [
            (ModuleId::FrontLeft, &mut self.front_left),
            (ModuleId::FrontRight, &mut self.front_right),
            (ModuleId::RearLeft, &mut self.rear_left),
            (ModuleId::RearRight, &mut self.rear_right),
        ]
        .into_iter()
    }
}

impl<T> Index<ModuleId> for ModuleSet<T> {
    type Output = T;

    fn index(&self, id: ModuleId) -> &T {
        match id {
            ModuleId::FrontLeft => &self.front_left,
            ModuleId::FrontRight => &self.front_right,
            ModuleId::RearLeft => &self.rear_left,
            ModuleId::RearRight => &self.rear_right,
        }
    }
}

impl<T> IndexMut<ModuleId> for ModuleSet<T> {
    fn index_mut(&mut self, id: ModuleId) -> &mut T {
        match id {
            ModuleId::FrontLeft => &mut self.front_left,
            ModuleId::FrontRight => &mut self.front_right,
            ModuleId::RearLeft => &mut self.rear_left,
            ModuleId::RearRight => &mut self.rear_right,
        }
    }
}

/// Chassis dimensions between wheel contact points, halved.
/// Units only need to be consistent with each other.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChassisGeometry {
    half_track_width: f64,
    half_wheel_base: f64,
}

impl ChassisGeometry {
    /// Both dimensions must be finite and positive; `DriveConfig::validate`
    /// enforces this for loaded configs.
    pub fn new(half_track_width: f64, half_wheel_base: f64) -> Self {
        debug_assert!(
            half_track_width.is_finite() && half_track_width > 0.0,
            "half track width must be positive, got {}",
            half_track_width
        );
        debug_assert!(
            half_wheel_base.is_finite() && half_wheel_base > 0.0,
            "half wheelbase must be positive, got {}",
            half_wheel_base
        );
        Self {
            half_track_width,
            half_wheel_base,
        }
    }

    pub fn half_track_width(&self) -> f64 {
        self.half_track_width
    }

    pub fn half_wheel_base(&self) -> f64 {
        self.half_wheel_base
    }

    /// Distance from the chassis centre to any wheel
    pub fn diagonal(&self) -> f64 {
        self.half_wheel_base.hypot(self.half_track_width)
    }
}

/// Robot-frame motion for a single cycle, each channel nominally in [-1, 1]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotionRequest {
    pub forward: f64,
    pub strafe: f64,
    pub rotate: f64,
}

impl MotionRequest {
    pub fn new(forward: f64, strafe: f64, rotate: f64) -> Self {
        Self {
            forward,
            strafe,
            rotate,
        }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// Scale all three channels together so none exceeds 1.0.
    pub fn normalized(self) -> Self {
        let [forward, strafe, rotate] = normalize([self.forward, self.strafe, self.rotate]);
        Self {
            forward,
            strafe,
            rotate,
        }
    }
}

/// Target for one wheel: speed in [-1, 1] and absolute angle in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ModuleCommand {
    pub speed: f64,
    pub angle_deg: f64,
}

/// Divide every value by the largest magnitude if that magnitude exceeds 1.0.
///
/// Joint scaling keeps the ratios (and so the direction of combined motion);
/// clamping each value independently would not.
pub fn normalize<const N: usize>(values: [f64; N]) -> [f64; N] {
    let max = values.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
    if max > 1.0 {
        values.map(|v| v / max)
    } else {
        values
    }
}

/// Compute speed and angle for every wheel.
///
/// The request is jointly normalized first, and the four wheel speeds are
/// normalized again afterwards so the fastest wheel runs at most at 1.0.
pub fn inverse_kinematics(
    geometry: &ChassisGeometry,
    request: MotionRequest,
) -> ModuleSet<ModuleCommand> {
    let MotionRequest {
        forward,
        strafe,
        rotate,
    } = request.normalized();

    let ratio = geometry.diagonal();
    let lon = rotate * (geometry.half_wheel_base() / ratio);
    let lat = rotate * (geometry.half_track_width() / ratio);

    // Lateral component depends on front/rear, longitudinal on left/right
    let rear_x = strafe - lon;
    let front_x = strafe + lon;
    let right_y = forward - lat;
    let left_y = forward + lat;

    let components = ModuleSet::from_fn(|id| {
        let x = if id.is_front() { front_x } else { rear_x };
        let y = if id.is_left() { left_y } else { right_y };
        (x, y)
    });

    let mut commands = components.map(|_, (x, y)| ModuleCommand {
        speed: x.hypot(y),
        angle_deg: x.atan2(y).to_degrees(),
    });

    let [fl, fr, rl, rr] = normalize([
        commands.front_left.speed,
        commands.front_right.speed,
        commands.rear_left.speed,
        commands.rear_right.speed,
    ]);
    commands.front_left.speed = fl;
    commands.front_right.speed = fr;
    commands.rear_left.speed = rl;
    commands.rear_right.speed = rr;

    commands
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn square() -> ChassisGeometry {
        ChassisGeometry::new(0.5, 0.5)
    }

    fn max_speed(commands: &ModuleSet<ModuleCommand>) -> f64 {
        commands
            .iter()
            .fold(0.0f64, |acc, (_, c)| acc.max(c.speed.abs()))
    }

    #[test]
    fn test_normalize_preserves_ratios() {
        let out = normalize([2.0, -1.0, 0.5]);
        assert!((out[0] - 1.0).abs() < EPS);
        assert!((out[1] + 0.5).abs() < EPS);
        assert!((out[2] - 0.25).abs() < EPS);
    }

    #[test]
    fn test_normalize_leaves_small_values() {
        assert_eq!(normalize([0.3, -0.9, 1.0]), [0.3, -0.9, 1.0]);
        assert_eq!(normalize([0.0, 0.0, 0.0]), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_normalized_request_bound() {
        let samples = [-3.0, -1.5, -1.0, -0.4, 0.0, 0.7, 1.0, 2.5];
        for &f in &samples {
            for &s in &samples {
                for &r in &samples {
                    let n = MotionRequest::new(f, s, r).normalized();
                    let max = n.forward.abs().max(n.strafe.abs()).max(n.rotate.abs());
                    assert!(max <= 1.0 + EPS);

                    let orig_max = f.abs().max(s.abs()).max(r.abs());
                    if orig_max > 1.0 {
                        // parallel: every channel scaled by the same factor
                        assert!((n.forward * orig_max - f).abs() < EPS);
                        assert!((n.strafe * orig_max - s).abs() < EPS);
                        assert!((n.rotate * orig_max - r).abs() < EPS);
                    }
                }
            }
        }
    }

    #[test]
    fn test_zero_motion() {
        let commands = inverse_kinematics(&square(), MotionRequest::zero());
        for (_, c) in commands.iter() {
            assert_eq!(c.speed, 0.0);
        }
    }

    #[test]
    fn test_pure_forward() {
        let commands = inverse_kinematics(&square(), MotionRequest::new(1.0, 0.0, 0.0));
        for (id, c) in commands.iter() {
            assert!((c.speed - 1.0).abs() < EPS, "{:?} speed {}", id, c.speed);
            assert!(c.angle_deg.abs() < EPS, "{:?} angle {}", id, c.angle_deg);
        }
    }

    #[test]
    fn test_pure_strafe_points_right() {
        let commands = inverse_kinematics(&square(), MotionRequest::new(0.0, 0.5, 0.0));
        for (_, c) in commands.iter() {
            assert!((c.speed - 0.5).abs() < EPS);
            assert!((c.angle_deg - 90.0).abs() < EPS);
        }
    }

    #[test]
    fn test_pure_rotation_is_tangent() {
        let geometry = ChassisGeometry::new(0.3, 0.5);
        let commands = inverse_kinematics(&geometry, MotionRequest::new(0.0, 0.0, 1.0));

        let first = commands.front_left.speed;
        for (id, c) in commands.iter() {
            assert!((c.speed - first).abs() < EPS);

            // Wheel position with x to the right and y forward
            let px = if id.is_left() { -0.3 } else { 0.3 };
            let py = if id.is_front() { 0.5 } else { -0.5 };

            // Direction of travel is perpendicular to the radius
            let a = c.angle_deg.to_radians();
            let (dx, dy) = (a.sin(), a.cos());
            assert!((dx * px + dy * py).abs() < EPS, "{:?} not tangent", id);

            // Clockwise: the velocity is (py, -px) direction
            assert!(dx * py - dy * px > 0.0, "{:?} wrong rotation sense", id);
        }
    }

    #[test]
    fn test_pure_rotation_square_diagonals() {
        let commands = inverse_kinematics(&square(), MotionRequest::new(0.0, 0.0, 1.0));
        assert!((commands.front_left.angle_deg - 45.0).abs() < EPS);
        assert!((commands.front_right.angle_deg - 135.0).abs() < EPS);
        assert!((commands.rear_right.angle_deg + 135.0).abs() < EPS);
        assert!((commands.rear_left.angle_deg + 45.0).abs() < EPS);
    }

    #[test]
    fn test_speed_bound_for_combined_motion() {
        let geometry = ChassisGeometry::new(34.5 / 12.0 / 2.0, 38.0 / 12.0 / 2.0);
        let samples = [-2.0, -1.0, -0.3, 0.0, 0.6, 1.0, 1.7];
        for &f in &samples {
            for &s in &samples {
                for &r in &samples {
                    let commands = inverse_kinematics(&geometry, MotionRequest::new(f, s, r));
                    assert!(max_speed(&commands) <= 1.0 + EPS);
                }
            }
        }
    }

    #[test]
    fn test_wheel_speed_ratios_preserved() {
        // Forward + rotation: left side outruns the right side
        let commands = inverse_kinematics(&square(), MotionRequest::new(1.0, 0.0, 1.0));
        assert!((max_speed(&commands) - 1.0).abs() < EPS);
        assert!(commands.front_left.speed > commands.front_right.speed);
        assert!((commands.front_left.speed - commands.rear_left.speed).abs() < EPS);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "half track width must be positive")]
    fn test_degenerate_geometry_rejected() {
        ChassisGeometry::new(0.0, 0.0);
    }

    #[test]
    fn test_module_set_indexing() {
        let mut set = ModuleSet::from_fn(|id| id.is_front());
        assert!(set[ModuleId::FrontRight]);
        assert!(!set[ModuleId::RearLeft]);

        set[ModuleId::RearLeft] = true;
        assert!(set.rear_left);
        assert_eq!(set.iter().filter(|(_, v)| **v).count(), 3);
    }
}
