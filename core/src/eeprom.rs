//! Byte-addressed, byte-granular, non-volatile data memory.

/// EEPROM backing store, accessed via opaque `ee_read`/`ee_write` hooks from
/// the data-memory path and directly by the GDB dispatcher's EEPROM address
/// space.
#[derive(Debug, Default)]
pub struct Eeprom {
    bytes: Vec<u8>,
}

impl Eeprom {
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            bytes: vec![0xff; len],
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[must_use]
    pub fn read(&self, addr: u32) -> u8 {
        self.bytes.get(addr as usize).copied().unwrap_or(0xff)
    }

    pub fn write(&mut self, addr: u32, val: u8) {
        if let Some(b) = self.bytes.get_mut(addr as usize) {
            *b = val;
        }
    }

    pub fn load(&mut self, image: &[u8]) {
        let n = image.len().min(self.bytes.len());
        self.bytes[..n].copy_from_slice(&image[..n]);
    }
}
