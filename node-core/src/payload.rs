//! Wire framing of one measurement handed to the serial transmitter.

/// Encoded size of a [`Measurement`].
pub const PAYLOAD_LEN: usize = 5;

/// Latest temperature and status output level.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Measurement {
    pub temperature_celsius: f32,
    pub led_status: bool,
}

impl Measurement {
    /// Little-endian `f32` followed by the status byte (0 or 1).
    #[must_use]
    pub fn encode(&self) -> [u8; PAYLOAD_LEN] {
        let mut frame = [0u8; PAYLOAD_LEN];
        frame[..4].copy_from_slice(&self.temperature_celsius.to_le_bytes());
        frame[4] = u8::from(self.led_status);
        frame
    }

    /// Decodes a frame. Returns `None` when the status byte is not 0 or 1.
    #[must_use]
    pub fn decode(frame: &[u8; PAYLOAD_LEN]) -> Option<Self> {
        let led_status = match frame[4] {
            0 => false,
            1 => true,
            _ => return None,
        };
        Some(Self {
            temperature_celsius: f32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]),
            led_status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_layout_is_little_endian_then_status() {
        let frame = Measurement {
            temperature_celsius: 25.0,
            led_status: true,
        }
        .encode();
        assert_eq!(frame, [0x00, 0x00, 0xC8, 0x41, 0x01]);
    }

    #[test]
    fn rejects_invalid_status_byte() {
        assert_eq!(Measurement::decode(&[0, 0, 0xC8, 0x41, 0x02]), None);
        let decoded = Measurement::decode(&[0, 0, 0xC8, 0x41, 0x00]).unwrap();
        assert!(!decoded.led_status);
        assert_eq!(decoded.temperature_celsius.to_bits(), 25.0f32.to_bits());
    }
}
