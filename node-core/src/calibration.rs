//! Two-point factory calibration for the on-die temperature channel.

/// Anchors read once from the device information page at startup.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TemperatureCalibration {
    /// Temperature (°C) at which the factory anchor code was measured.
    pub cal_temp_anchor: f32,
    /// ADC code measured at [`cal_temp_anchor`](Self::cal_temp_anchor).
    pub cal_code_anchor: f32,
    /// Codes per degree Celsius; negative when the code falls with heat.
    pub gradient: f32,
}

impl TemperatureCalibration {
    #[must_use]
    pub const fn new(cal_temp_anchor: f32, cal_code_anchor: f32, gradient: f32) -> Self {
        Self {
            cal_temp_anchor,
            cal_code_anchor,
            gradient,
        }
    }

    /// Builds a calibration from two factory points `(celsius, code)`.
    ///
    /// Returns `None` when both points share a temperature.
    #[must_use]
    pub fn from_two_points(low: (f32, u16), high: (f32, u16)) -> Option<Self> {
        let span = high.0 - low.0;
        if span == 0.0 {
            return None;
        }
        let gradient = (f32::from(high.1) - f32::from(low.1)) / span;
        Some(Self::new(low.0, f32::from(low.1), gradient))
    }

    /// Converts a mean raw code into degrees Celsius.
    #[must_use]
    pub fn celsius(&self, raw_mean: u32) -> f32 {
        #[allow(clippy::cast_precision_loss)]
        let raw = raw_mean as f32;
        self.cal_temp_anchor - (self.cal_code_anchor - raw) / self.gradient
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        let delta = a - b;
        delta < 1e-4 && delta > -1e-4
    }

    #[test]
    fn anchor_code_maps_to_anchor_temperature() {
        let cal = TemperatureCalibration::new(25.0, 100.0, 10.0);
        assert!(close(cal.celsius(100), 25.0));
        assert!(close(cal.celsius(99), 24.9));
        assert!(close(cal.celsius(120), 27.0));
    }

    #[test]
    fn negative_gradient_inverts_direction() {
        let cal = TemperatureCalibration::new(25.0, 2000.0, -6.3);
        assert!(cal.celsius(1937) > 25.0);
    }

    #[test]
    fn two_point_calibration_derives_gradient() {
        let cal = TemperatureCalibration::from_two_points((30.0, 1000), (130.0, 1340)).unwrap();
        assert!(close(cal.gradient, 3.4));
        assert!(close(cal.celsius(1034), 40.0));
        assert!(TemperatureCalibration::from_two_points((30.0, 1), (30.0, 2)).is_none());
    }
}
