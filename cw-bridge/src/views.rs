use crate::bridge::{BridgeError, BridgeResult};

/// Backing storage for the guest's linear memory. Growth keeps existing
/// contents but invalidates every outstanding view, so each grow bumps
/// the generation counter the view manager watches.
pub struct GuestMemory {
    bytes: Vec<u8>,
    generation: u64,
}

impl GuestMemory {
    pub fn new(initial: u32) -> Self {
        Self {
            bytes: vec![0; initial as usize],
            generation: 1,
        }
    }

    pub fn len(&self) -> u32 {
        self.bytes.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn grow(&mut self, additional: u32) {
        if additional == 0 {
            return;
        }
        let target = self.bytes.len() + additional as usize;
        self.bytes.resize(target, 0);
        self.generation += 1;
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

/// Tracks which memory snapshot the cached views were built against and
/// rebuilds them lazily whenever the generation or length moved.
pub struct ViewManager {
    generation: u64,
    length: u32,
    rebuilds: u64,
}

impl ViewManager {
    pub fn new() -> Self {
        Self {
            generation: 0,
            length: 0,
            rebuilds: 0,
        }
    }

    pub fn sync(&mut self, memory: &GuestMemory) {
        if self.generation != memory.generation() || self.length != memory.len() {
            self.rebuild(memory);
        }
    }

    fn rebuild(&mut self, memory: &GuestMemory) {
        self.generation = memory.generation();
        self.length = memory.len();
        self.rebuilds += 1;
    }

    pub fn views<'a>(&mut self, memory: &'a GuestMemory) -> Views<'a> {
        self.sync(memory);
        Views {
            bytes: memory.as_slice(),
        }
    }

    pub fn views_mut<'a>(&mut self, memory: &'a mut GuestMemory) -> ViewsMut<'a> {
        self.sync(&*memory);
        ViewsMut {
            bytes: memory.as_mut_slice(),
        }
    }

    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    pub fn reset(&mut self) {
        self.generation = 0;
        self.length = 0;
        self.rebuilds = 0;
    }
}

impl Default for ViewManager {
    fn default() -> Self {
        Self::new()
    }
}

fn range(len: usize, address: u32, length: u32) -> BridgeResult<std::ops::Range<usize>> {
    let start = address as usize;
    let end = start
        .checked_add(length as usize)
        .ok_or(BridgeError::OutOfBounds { address, length })?;
    if end > len {
        return Err(BridgeError::OutOfBounds { address, length });
    }
    Ok(start..end)
}

/// Read-only typed access into guest memory, little-endian throughout.
pub struct Views<'a> {
    bytes: &'a [u8],
}

impl Views<'_> {
    fn read_array<const N: usize>(&self, address: u32) -> BridgeResult<[u8; N]> {
        let range = range(self.bytes.len(), address, N as u32)?;
        let mut out = [0; N];
        out.copy_from_slice(&self.bytes[range]);
        Ok(out)
    }

    pub fn read_bytes(&self, address: u32, length: u32) -> BridgeResult<&[u8]> {
        let range = range(self.bytes.len(), address, length)?;
        Ok(&self.bytes[range])
    }

    pub fn read_u8(&self, address: u32) -> BridgeResult<u8> {
        Ok(self.read_array::<1>(address)?[0])
    }

    pub fn read_i8(&self, address: u32) -> BridgeResult<i8> {
        Ok(self.read_array::<1>(address)?[0] as i8)
    }

    pub fn read_u16(&self, address: u32) -> BridgeResult<u16> {
        Ok(u16::from_le_bytes(self.read_array(address)?))
    }

    pub fn read_i16(&self, address: u32) -> BridgeResult<i16> {
        Ok(i16::from_le_bytes(self.read_array(address)?))
    }

    pub fn read_u32(&self, address: u32) -> BridgeResult<u32> {
        Ok(u32::from_le_bytes(self.read_array(address)?))
    }

    pub fn read_i32(&self, address: u32) -> BridgeResult<i32> {
        Ok(i32::from_le_bytes(self.read_array(address)?))
    }

    pub fn read_f32(&self, address: u32) -> BridgeResult<f32> {
        Ok(f32::from_le_bytes(self.read_array(address)?))
    }

    pub fn read_f64(&self, address: u32) -> BridgeResult<f64> {
        Ok(f64::from_le_bytes(self.read_array(address)?))
    }
}

/// Mutable typed access into guest memory. Holding one of these pins the
/// memory borrow, so allocation has to happen before the views are taken.
pub struct ViewsMut<'a> {
    bytes: &'a mut [u8],
}

impl ViewsMut<'_> {
    fn write_array<const N: usize>(&mut self, address: u32, bytes: [u8; N]) -> BridgeResult<()> {
        let range = range(self.bytes.len(), address, N as u32)?;
        self.bytes[range].copy_from_slice(&bytes);
        Ok(())
    }

    pub fn write_bytes(&mut self, address: u32, bytes: &[u8]) -> BridgeResult<()> {
        let length = u32::try_from(bytes.len()).map_err(|_| BridgeError::OutOfBounds {
            address,
            length: u32::MAX,
        })?;
        let range = range(self.bytes.len(), address, length)?;
        self.bytes[range].copy_from_slice(bytes);
        Ok(())
    }

    pub fn write_u8(&mut self, address: u32, value: u8) -> BridgeResult<()> {
        self.write_array(address, [value])
    }

    pub fn write_i8(&mut self, address: u32, value: i8) -> BridgeResult<()> {
        self.write_array(address, [value as u8])
    }

    pub fn write_u16(&mut self, address: u32, value: u16) -> BridgeResult<()> {
        self.write_array(address, value.to_le_bytes())
    }

    pub fn write_i16(&mut self, address: u32, value: i16) -> BridgeResult<()> {
        self.write_array(address, value.to_le_bytes())
    }

    pub fn write_u32(&mut self, address: u32, value: u32) -> BridgeResult<()> {
        self.write_array(address, value.to_le_bytes())
    }

    pub fn write_i32(&mut self, address: u32, value: i32) -> BridgeResult<()> {
        self.write_array(address, value.to_le_bytes())
    }

    pub fn write_f32(&mut self, address: u32, value: f32) -> BridgeResult<()> {
        self.write_array(address, value.to_le_bytes())
    }

    pub fn write_f64(&mut self, address: u32, value: f64) -> BridgeResult<()> {
        self.write_array(address, value.to_le_bytes())
    }
}
