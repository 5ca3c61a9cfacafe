#[inline]
pub fn linear_ramp(distance: f64, radius: f64, strength: f64) -> f64 {
    if distance >= radius {
        return 0.0;
    }
    strength * (1.0 - distance / radius)
}

#[inline]
pub fn quadratic_outside(value: f64, min: f64, max: f64) -> f64 {
    if value < min {
        (min - value).powi(2)
    } else if value > max {
        (value - max).powi(2)
    } else {
        0.0
    }
}

#[inline]
pub fn contrast(mean: f64, threshold: f64, scale: f64) -> f64 {
    (threshold - mean) / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_ramp_is_strongest_at_contact_and_zero_beyond_radius() {
        assert_eq!(linear_ramp(0.0, 4.0, 2.0), 2.0);
        assert_eq!(linear_ramp(2.0, 4.0, 2.0), 1.0);
        assert_eq!(linear_ramp(4.0, 4.0, 2.0), 0.0);
        assert_eq!(linear_ramp(9.0, 4.0, 2.0), 0.0);
    }

    #[test]
    fn quadratic_outside_is_flat_inside_range() {
        assert_eq!(quadratic_outside(5.0, 1.0, 10.0), 0.0);
        assert_eq!(quadratic_outside(-1.0, 1.0, 10.0), 4.0);
        assert_eq!(quadratic_outside(13.0, 1.0, 10.0), 9.0);
    }

    #[test]
    fn contrast_is_negative_for_bright_marks() {
        assert!(contrast(200.0, 100.0, 50.0) < 0.0);
        assert_eq!(contrast(50.0, 100.0, 50.0), 1.0);
    }
}
