use std::collections::VecDeque;

use node_core::ring::{ByteRing, RingError};

struct XorShift(u32);

impl XorShift {
    fn next(&mut self) -> u32 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.0 = x;
        x
    }
}

#[test]
fn matches_a_reference_queue_for_random_traffic() {
    for capacity in [1usize, 2, 5, 7, 16] {
        let mut rng = XorShift(0x1234_5678 ^ capacity as u32);
        let mut ring: ByteRing<16> = ByteRing::new();
        ring.allocate(capacity).expect("capacity fits storage");
        let mut model: VecDeque<u8> = VecDeque::new();

        for step in 0..2_000u32 {
            if rng.next() % 3 == 0 {
                let expected = model.pop_front().ok_or(RingError::Empty);
                assert_eq!(ring.dequeue(), expected, "capacity {capacity} step {step}");
            } else {
                let byte = (rng.next() & 0xFF) as u8;
                if model.len() < capacity {
                    ring.enqueue(byte).expect("room available");
                    model.push_back(byte);
                } else {
                    assert_eq!(ring.enqueue(byte), Err(RingError::Full));
                }
            }
            assert_eq!(ring.len(), model.len());
            assert!(ring.len() <= ring.capacity());
        }
    }
}

#[test]
fn fill_then_drain_returns_to_empty() {
    let mut ring: ByteRing<5> = ByteRing::new();
    for round in 0..4u8 {
        let burst = [round, round + 1, round + 2, round + 3, round + 4];
        ring.extend_from_slice(&burst).expect("burst fits exactly");
        assert!(ring.is_full());

        let drained: Vec<u8> = std::iter::from_fn(|| ring.dequeue().ok()).collect();
        assert_eq!(drained, burst);
        assert!(ring.is_empty());
        assert_eq!(ring.free(), 5);
    }
}

#[test]
fn error_messages_are_readable() {
    assert_eq!(RingError::Full.to_string(), "ring buffer full");
    assert_eq!(
        RingError::CapacityExceeded {
            requested: 9,
            max: 5
        }
        .to_string(),
        "capacity 9 exceeds storage of 5 bytes"
    );
}
