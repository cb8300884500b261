/// A serial type, whose comparison takes into account the wrapping-around behavior of the
/// underlying counter.
#[derive(Debug, Copy, Clone, Default, Hash)]
pub struct Serial(pub(crate) u32);

impl PartialEq for Serial {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Serial {}

impl PartialOrd for Serial {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        let distance = if self.0 > other.0 {
            self.0 - other.0
        } else {
            other.0 - self.0
        };
        if distance < u32::MAX / 2 {
            self.0.partial_cmp(&other.0)
        } else {
            // wrap-around occurred, invert comparison
            other.0.partial_cmp(&self.0)
        }
    }
}

impl From<u32> for Serial {
    fn from(n: u32) -> Self {
        Serial(n)
    }
}

impl From<Serial> for u32 {
    fn from(serial: Serial) -> u32 {
        serial.0
    }
}

impl Serial {
    /// Checks if a serial was generated after or is equal to another given serial
    pub fn is_no_older_than(&self, other: &Serial) -> bool {
        other <= self
    }

    /// The serial following this one, wrapping on overflow
    #[must_use]
    pub fn next(self) -> Serial {
        Serial(self.0.wrapping_add(1))
    }

    /// Advance in place and return the previous value
    pub(crate) fn bump(&mut self) -> Serial {
        let old = *self;
        *self = self.next();
        old
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::eq_op)]
    fn serial_equals_self() {
        let serial = Serial(7);
        assert!(serial == serial);
    }

    #[test]
    fn consecutive_serials() {
        let serial1 = Serial(0);
        let serial2 = serial1.next();
        assert!(serial1 < serial2);
        assert!(serial2.is_no_older_than(&serial1));
    }

    #[test]
    fn bump_returns_previous() {
        let mut serial = Serial(41);
        assert_eq!(serial.bump(), Serial(41));
        assert_eq!(serial, Serial(42));
    }

    #[test]
    fn serial_wrap_around() {
        let serial1 = Serial(u32::MAX);
        let serial2 = serial1.next();

        assert!(serial2 == 0.into());
        assert!(serial1 < serial2);
    }
}
