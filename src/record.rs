use bytemuck::{Pod, Zeroable};

/// One entry of the shared buffer: `[x][y][z]`, 4-byte floats, native endian.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct VectorRecord {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

pub const RECORD_SIZE: usize = size_of::<VectorRecord>();

impl VectorRecord {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// A record takes part in updates when its component sum is non-zero.
    pub fn is_active(&self) -> bool {
        self.x + self.y + self.z != 0.0
    }

    /// Scales every component by `factor`.
    pub fn grow(&mut self, factor: f32) {
        self.x *= factor;
        self.y *= factor;
        self.z *= factor;
    }
}

impl From<[f32; 3]> for VectorRecord {
    fn from([x, y, z]: [f32; 3]) -> Self {
        Self::new(x, y, z)
    }
}
