//! Explicitly capacitied owned buffers.
//!
//! Every copy into one of these buffers is checked against its capacity and
//! reports [`CapacityError`] instead of truncating.

use std::fmt;

/// Raised when a copy would exceed a buffer's fixed capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapacityError {
    /// Name of the buffer that rejected the write.
    pub field: &'static str,
    /// Maximum number of bytes the buffer accepts.
    pub capacity: usize,
    /// Number of bytes the caller tried to store.
    pub requested: usize,
}

impl CapacityError {
    #[must_use]
    pub fn new(field: &'static str, capacity: usize, requested: usize) -> Self {
        Self {
            field,
            capacity,
            requested,
        }
    }
}

impl std::error::Error for CapacityError {}

impl fmt::Display for CapacityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} exceeds capacity: {} bytes requested, {} available",
            self.field, self.requested, self.capacity
        )
    }
}

/// Byte buffer with a fixed capacity decided at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedBuffer {
    name: &'static str,
    data: Vec<u8>,
    capacity: usize,
}

impl FixedBuffer {
    #[must_use]
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            data: Vec::with_capacity(capacity),
            capacity,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Replaces the buffer content with `src`.
    ///
    /// # Errors
    ///
    /// Returns [`CapacityError`] and leaves the current content untouched
    /// when `src` is longer than the capacity.
    pub fn copy_from(&mut self, src: &[u8]) -> Result<(), CapacityError> {
        if src.len() > self.capacity {
            return Err(CapacityError::new(self.name, self.capacity, src.len()));
        }
        self.data.clear();
        self.data.extend_from_slice(src);
        Ok(())
    }

    /// Returns the first `len` bytes of the stored content.
    ///
    /// # Errors
    ///
    /// Returns [`CapacityError`] when `len` reaches past the stored bytes.
    pub fn prefix(&self, len: usize) -> Result<&[u8], CapacityError> {
        self.data
            .get(..len)
            .ok_or_else(|| CapacityError::new(self.name, self.data.len(), len))
    }
}

/// String with a maximum byte length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundedString {
    name: &'static str,
    value: String,
    max_len: usize,
}

impl BoundedString {
    #[must_use]
    pub fn new(name: &'static str, max_len: usize) -> Self {
        Self {
            name,
            value: String::new(),
            max_len,
        }
    }

    /// Creates the string already holding `value`.
    ///
    /// # Errors
    ///
    /// Returns [`CapacityError`] when `value` is longer than `max_len`.
    pub fn with_value(
        name: &'static str,
        max_len: usize,
        value: &str,
    ) -> Result<Self, CapacityError> {
        let mut bounded = Self::new(name, max_len);
        bounded.set(value)?;
        Ok(bounded)
    }

    /// Overwrites the current value.
    ///
    /// # Errors
    ///
    /// Returns [`CapacityError`] when `value` is longer than the maximum
    /// length; the previous value is kept.
    pub fn set(&mut self, value: &str) -> Result<(), CapacityError> {
        if value.len() > self.max_len {
            return Err(CapacityError::new(self.name, self.max_len, value.len()));
        }
        self.value.clear();
        self.value.push_str(value);
        Ok(())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.value
    }

    #[must_use]
    pub fn max_len(&self) -> usize {
        self.max_len
    }
}

impl fmt::Display for BoundedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// WHY: Over-capacity writes must fail closed
    /// WHAT: A rejected copy keeps the previous content intact
    #[test]
    fn test_fixed_buffer_rejects_oversized_copy() {
        let mut buffer = FixedBuffer::new("payload", 4);
        buffer.copy_from(b"abcd").unwrap();

        let err = buffer.copy_from(b"abcde").unwrap_err();
        assert_eq!(err, CapacityError::new("payload", 4, 5));
        assert_eq!(buffer.as_slice(), b"abcd");
    }

    #[test]
    fn test_fixed_buffer_prefix_is_bounded_by_content() {
        let mut buffer = FixedBuffer::new("payload", 16);
        buffer.copy_from(b"hello").unwrap();

        assert_eq!(buffer.prefix(3).unwrap(), b"hel");
        assert_eq!(buffer.prefix(5).unwrap(), b"hello");
        assert!(buffer.prefix(6).is_err());
    }

    #[test]
    fn test_bounded_string_keeps_previous_value_on_failure() {
        let mut protocol = BoundedString::with_value("protocol", 8, "HTTP/1.1").unwrap();
        assert!(protocol.set("HTTP/1.1-extended").is_err());
        assert_eq!(protocol.as_str(), "HTTP/1.1");
    }
}
