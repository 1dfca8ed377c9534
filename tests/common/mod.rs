//! Shared raster generators for the integration tests.
#![allow(dead_code)]

/// Deterministic pseudo-random pixel stream; enough mixing that no two
/// 8x8 blocks repeat by accident.
pub fn noise_image(xsize: usize, ysize: usize, seed: u32) -> Vec<u8> {
    let mut rgba = Vec::with_capacity(xsize * ysize * 4);
    for y in 0..ysize {
        for x in 0..xsize {
            let mut v = (x as u32)
                .wrapping_mul(2654435761)
                .wrapping_add((y as u32).wrapping_mul(40503))
                .wrapping_add(seed.wrapping_mul(97));
            v ^= v >> 15;
            v = v.wrapping_mul(2246822519);
            v ^= v >> 13;
            rgba.extend_from_slice(&[v as u8, (v >> 8) as u8, (v >> 16) as u8, 255]);
        }
    }
    rgba
}

/// 8x8 horizontal red gradient, fully opaque.
pub fn gradient_8x8() -> Vec<u8> {
    let mut rgba = Vec::with_capacity(8 * 8 * 4);
    for _y in 0..8 {
        for x in 0..8u32 {
            rgba.extend_from_slice(&[(x * 32) as u8, 0, 0, 255]);
        }
    }
    rgba
}

/// Two-color checkerboard.
pub fn checkerboard(xsize: usize, ysize: usize) -> Vec<u8> {
    let a = [10u8, 200, 30, 255];
    let b = [200u8, 10, 250, 255];
    let mut rgba = Vec::with_capacity(xsize * ysize * 4);
    for y in 0..ysize {
        for x in 0..xsize {
            rgba.extend_from_slice(if (x + y) % 2 == 0 { &a } else { &b });
        }
    }
    rgba
}

/// Noise raster whose lower-right quadrant duplicates the upper-left, so
/// the block matcher has exactly one thing to find.
pub fn with_duplicate_block(xsize: usize, ysize: usize) -> Vec<u8> {
    let mut rgba = noise_image(xsize, ysize, 0xD00D);
    let (hw, hh) = (xsize / 2, ysize / 2);
    for y in 0..hh {
        for x in 0..hw {
            let src = (y * xsize + x) * 4;
            let dst = ((y + hh) * xsize + x + hw) * 4;
            rgba.copy_within(src..src + 4, dst);
        }
    }
    rgba
}

/// Sprite-like raster: transparent background, a shaded opaque body and a
/// few repeated ornaments.
pub fn sprite_image(xsize: usize, ysize: usize) -> Vec<u8> {
    let mut rgba = vec![0u8; xsize * ysize * 4];
    let put = |rgba: &mut [u8], x: usize, y: usize, px: [u8; 4]| {
        let off = (y * xsize + x) * 4;
        rgba[off..off + 4].copy_from_slice(&px);
    };

    // Body: a filled diamond with shaded rows.
    let (cx, cy) = (xsize / 2, ysize / 2);
    let r = xsize.min(ysize) / 3;
    for y in 0..ysize {
        for x in 0..xsize {
            let d = x.abs_diff(cx) + y.abs_diff(cy);
            if d < r {
                let shade = 120 + ((y * 90) / ysize) as u8;
                put(&mut rgba, x, y, [shade, (60 + d * 9) as u8, 40, 255]);
            }
        }
    }

    // Ornaments: one 8x8 stamp repeated in the corners.
    for &(ox, oy) in &[(1usize, 1usize), (xsize - 10, 1), (1, ysize - 10)] {
        for y in 0..8 {
            for x in 0..8 {
                let v = if (x + y) % 2 == 0 { 230 } else { 25 };
                put(&mut rgba, ox + x, oy + y, [v, v, 80, 255]);
            }
        }
    }

    rgba
}
