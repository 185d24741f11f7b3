//! CPU-side RGBA float images used by the reference device.

pub type Rgba = [f32; 4];

#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    width: u32,
    height: u32,
    pixels: Vec<Rgba>,
}

impl Image {
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, [0.0; 4])
    }

    pub fn filled(width: u32, height: u32, value: Rgba) -> Self {
        Self {
            width,
            height,
            pixels: vec![value; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[Rgba] {
        &self.pixels
    }

    pub fn get(&self, x: u32, y: u32) -> Rgba {
        self.pixels[self.index(x, y)]
    }

    pub fn set(&mut self, x: u32, y: u32, value: Rgba) {
        let i = self.index(x, y);
        self.pixels[i] = value;
    }

    /// Read with clamp-to-edge addressing.
    pub fn load_clamped(&self, x: i32, y: i32) -> Rgba {
        let cx = x.clamp(0, self.width as i32 - 1) as u32;
        let cy = y.clamp(0, self.height as i32 - 1) as u32;
        self.get(cx, cy)
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }
}

/// Component-wise `a * (1 - w) + b * w`, the WGSL `mix`.
pub fn mix(a: Rgba, b: Rgba, w: f32) -> Rgba {
    [
        a[0] * (1.0 - w) + b[0] * w,
        a[1] * (1.0 - w) + b[1] * w,
        a[2] * (1.0 - w) + b[2] * w,
        a[3] * (1.0 - w) + b[3] * w,
    ]
}

pub fn mix_scalar(a: f32, b: f32, w: f32) -> f32 {
    a * (1.0 - w) + b * w
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamped_loads_stick_to_edges() {
        let mut img = Image::new(3, 2);
        img.set(0, 0, [1.0, 0.0, 0.0, 1.0]);
        img.set(2, 1, [0.0, 0.0, 1.0, 1.0]);
        assert_eq!(img.load_clamped(-5, -1), [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(img.load_clamped(10, 7), [0.0, 0.0, 1.0, 1.0]);
    }
}
