// Proportional auto-centering: target centroid (pixels) -> axis velocities
//
// Horizontally the target should sit inside a dead-zone box around the frame
// centre; vertically it should sit between two guide lines. Outside, speed
// grows linearly with the distance to the nearest edge, from min to max speed,
// saturating at half a frame away.

use crate::config::TrackingConfig;
use crate::messages::TrackingTarget;

/// Pixel geometry derived from the frame size and dead-zone configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadZone {
    pub left: i32,
    pub right: i32,
    pub upper_line: i32,
    pub lower_line: i32,
}

#[derive(Debug, Clone, Copy)]
pub struct AutoTracker {
    config: TrackingConfig,
}

impl AutoTracker {
    pub fn new(config: TrackingConfig) -> Self {
        Self { config }
    }

    fn center(&self) -> (i32, i32) {
        (
            (self.config.frame_width / 2) as i32,
            (self.config.frame_height / 2) as i32,
        )
    }

    pub fn dead_zone(&self) -> DeadZone {
        let (cx, cy) = self.center();
        let half_box = (self.config.dead_zone_width / 2) as i32;
        DeadZone {
            left: cx - half_box,
            right: cx + half_box,
            upper_line: cy - self.config.upper_line_offset as i32,
            lower_line: cy + self.config.lower_line_offset as i32,
        }
    }

    /// Speed for a target `distance` pixels outside the zone
    fn speed(&self, distance: i64, half_frame: i32) -> i32 {
        let ratio = (distance as f64 / half_frame as f64).clamp(0.0, 1.0);
        let min = self.config.min_auto_speed;
        let max = self.config.max_auto_speed;
        let speed = min as f64 + (max - min) as f64 * ratio;
        (speed as i32).max(min).min(max)
    }

    /// Velocities (horizontal, vertical) that move `target` toward the dead zone.
    ///
    /// Positive horizontal pans right, positive vertical tilts down.
    /// Any i32 centroid is accepted; distances are taken in i64.
    pub fn velocities(&self, target: &TrackingTarget) -> (i32, i32) {
        let (cx, cy) = self.center();
        let zone = self.dead_zone();
        let (x, y) = (target.x as i64, target.y as i64);

        let horizontal = if x < zone.left as i64 {
            self.speed(zone.left as i64 - x, cx)
        } else if x > zone.right as i64 {
            -self.speed(x - zone.right as i64, cx)
        } else {
            0
        };

        let vertical = if y < zone.upper_line as i64 {
            -self.speed(zone.upper_line as i64 - y, cy)
        } else if y > zone.lower_line as i64 {
            self.speed(y - zone.lower_line as i64, cy)
        } else {
            0
        };

        (horizontal, vertical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> AutoTracker {
        // 800x600 frame, 200x150 box, guide lines 80 px either side, speeds 5..30
        AutoTracker::new(TrackingConfig::default())
    }

    fn at(x: i32, y: i32) -> TrackingTarget {
        TrackingTarget { x, y, frame: None }
    }

    #[test]
    fn test_dead_zone_geometry() {
        assert_eq!(
            tracker().dead_zone(),
            DeadZone {
                left: 300,
                right: 500,
                upper_line: 220,
                lower_line: 380
            }
        );
    }

    #[test]
    fn test_centered_target_stops() {
        assert_eq!(tracker().velocities(&at(400, 300)), (0, 0));
        // Zone edges are inclusive
        assert_eq!(tracker().velocities(&at(300, 220)), (0, 0));
        assert_eq!(tracker().velocities(&at(500, 380)), (0, 0));
    }

    #[test]
    fn test_left_edge_of_frame() {
        // 300 px from the box edge over a 400 px half frame: 5 + 25 * 0.75 = 23.75
        let (h, v) = tracker().velocities(&at(0, 300));
        assert_eq!(h, 23);
        assert_eq!(v, 0);
    }

    #[test]
    fn test_speed_saturates() {
        let (h, _) = tracker().velocities(&at(-100, 300));
        assert_eq!(h, 30);
        let (h, _) = tracker().velocities(&at(2000, 300));
        assert_eq!(h, -30);
    }

    #[test]
    fn test_extreme_centroids_stay_within_speed_range() {
        let t = tracker();
        assert_eq!(t.velocities(&at(i32::MIN, 300)), (30, 0));
        assert_eq!(t.velocities(&at(i32::MAX, 300)), (-30, 0));
        assert_eq!(t.velocities(&at(400, i32::MIN)), (0, -30));
        assert_eq!(t.velocities(&at(400, i32::MAX)), (0, 30));
        assert_eq!(t.velocities(&at(i32::MIN, i32::MAX)), (30, 30));
    }

    #[test]
    fn test_just_outside_zone_is_slow() {
        let (h, v) = tracker().velocities(&at(501, 381));
        assert_eq!(h, -5);
        assert_eq!(v, 5);
    }

    #[test]
    fn test_signs_point_toward_center() {
        let t = tracker();
        // left of box -> pan right (+), right of box -> pan left (-)
        assert!(t.velocities(&at(100, 300)).0 > 0);
        assert!(t.velocities(&at(700, 300)).0 < 0);
        // above upper line -> tilt up (-), below lower line -> tilt down (+)
        assert!(t.velocities(&at(400, 50)).1 < 0);
        assert!(t.velocities(&at(400, 550)).1 > 0);
    }

    #[test]
    fn test_vertical_proportional() {
        // 220 - 70 = 150 px over a 300 px half frame: 5 + 25 * 0.5 = 17.5
        assert_eq!(tracker().velocities(&at(400, 70)), (0, -17));
    }
}
