use std::sync::Arc;

use pixels::{Error, Pixels, SurfaceTexture};
use winit::window::Window;

use crate::app::assets::{ImagePixels, ImageStore};
use crate::app::world::{Color, Size, Vector};

use super::commands::{RenderCommand, RenderCommandList};

const CLEAR_COLOR: [u8; 4] = [0, 0, 0, 255];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

pub struct Renderer {
    window: Arc<Window>,
    pixels: Pixels<'static>,
    viewport: Viewport,
}

impl Renderer {
    pub fn new(window: Arc<Window>) -> Result<Self, Error> {
        let size = window.inner_size();
        let pixels = Self::build_pixels(Arc::clone(&window), size.width, size.height)?;
        Ok(Self {
            window,
            pixels,
            viewport: Viewport {
                width: size.width,
                height: size.height,
            },
        })
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), Error> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.pixels = Self::build_pixels(Arc::clone(&self.window), width, height)?;
        self.viewport = Viewport { width, height };
        Ok(())
    }

    fn build_pixels(
        window: Arc<Window>,
        width: u32,
        height: u32,
    ) -> Result<Pixels<'static>, Error> {
        let surface = SurfaceTexture::new(width, height, window);
        Pixels::new(width, height, surface)
    }

    pub fn render(&mut self, list: &RenderCommandList, images: &ImageStore) -> Result<(), Error> {
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Ok(());
        }
        let Viewport { width, height } = self.viewport;
        draw_commands(self.pixels.frame_mut(), width, height, list, images);
        self.pixels.render()
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }
}

pub(crate) fn draw_commands(
    frame: &mut [u8],
    width: u32,
    height: u32,
    list: &RenderCommandList,
    images: &ImageStore,
) {
    for chunk in frame.chunks_exact_mut(4) {
        chunk.copy_from_slice(&CLEAR_COLOR);
    }
    for command in list.iter() {
        match command {
            RenderCommand::Rect { pos, size, color } => {
                fill_rect_clipped(frame, width, height, *pos, *size, *color);
            }
            RenderCommand::Pic {
                image,
                pos,
                size,
                src_pos,
                src_size,
            } => {
                if let Some(pixels) = images.get(*image) {
                    blit_scaled_clipped(
                        frame, width, height, pixels, *src_pos, *src_size, *pos, *size,
                    );
                }
            }
            RenderCommand::Text { .. } => {}
        }
    }
}

struct ClipRect {
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
}

fn clip(width: u32, height: u32, pos: Vector, size: Size) -> Option<ClipRect> {
    let right = pos.x.saturating_add(size.w).min(width as i32);
    let bottom = pos.y.saturating_add(size.h).min(height as i32);
    let left = pos.x.max(0);
    let top = pos.y.max(0);
    if left >= right || top >= bottom {
        return None;
    }
    Some(ClipRect {
        left,
        top,
        right,
        bottom,
    })
}

fn fill_rect_clipped(
    frame: &mut [u8],
    width: u32,
    height: u32,
    pos: Vector,
    size: Size,
    color: Color,
) {
    if color.a == 0 {
        return;
    }
    let Some(rect) = clip(width, height, pos, size) else {
        return;
    };
    for y in rect.top..rect.bottom {
        for x in rect.left..rect.right {
            blend_pixel_rgba_clipped(frame, width as usize, x, y, color.to_array());
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn blit_scaled_clipped(
    frame: &mut [u8],
    width: u32,
    height: u32,
    image: &ImagePixels,
    src_pos: Vector,
    src_size: Size,
    dst_pos: Vector,
    dst_size: Size,
) {
    if src_size.w <= 0 || src_size.h <= 0 || dst_size.w <= 0 || dst_size.h <= 0 {
        return;
    }
    let Some(rect) = clip(width, height, dst_pos, dst_size) else {
        return;
    };

    for out_y in rect.top..rect.bottom {
        let dy = i64::from(out_y - dst_pos.y);
        let src_y = i64::from(src_pos.y) + dy * i64::from(src_size.h) / i64::from(dst_size.h);
        for out_x in rect.left..rect.right {
            let dx = i64::from(out_x - dst_pos.x);
            let src_x = i64::from(src_pos.x) + dx * i64::from(src_size.w) / i64::from(dst_size.w);
            let (Ok(src_x), Ok(src_y)) = (u32::try_from(src_x), u32::try_from(src_y)) else {
                continue;
            };
            let Some(texel) = image.texel(src_x, src_y) else {
                continue;
            };
            if texel[3] == 0 {
                continue;
            }
            blend_pixel_rgba_clipped(frame, width as usize, out_x, out_y, texel);
        }
    }
}

fn blend_pixel_rgba_clipped(frame: &mut [u8], width: usize, x: i32, y: i32, color: [u8; 4]) {
    if x < 0 || y < 0 || x as usize >= width {
        return;
    }
    let x = x as usize;
    let y = y as usize;
    let Some(pixel_offset) = y.checked_mul(width).and_then(|row| row.checked_add(x)) else {
        return;
    };
    let Some(byte_offset) = pixel_offset.checked_mul(4) else {
        return;
    };
    let Some(end) = byte_offset.checked_add(4) else {
        return;
    };
    if end > frame.len() {
        return;
    }
    let dst = &mut frame[byte_offset..end];
    let alpha = u16::from(color[3]);
    if alpha == 255 {
        dst.copy_from_slice(&color);
        return;
    }
    for channel in 0..3 {
        let src = u16::from(color[channel]);
        let old = u16::from(dst[channel]);
        dst[channel] = ((src * alpha + old * (255 - alpha) + 127) / 255) as u8;
    }
    dst[3] = 255;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::bridge::ImageHandle;
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;

    const W: u32 = 8;
    const H: u32 = 4;

    fn frame() -> Vec<u8> {
        vec![0; (W * H * 4) as usize]
    }

    fn pixel(frame: &[u8], x: u32, y: u32) -> [u8; 4] {
        let offset = ((y * W + x) * 4) as usize;
        [
            frame[offset],
            frame[offset + 1],
            frame[offset + 2],
            frame[offset + 3],
        ]
    }

    fn checker_store(temp: &TempDir) -> ImageStore {
        let mut img = RgbaImage::new(4, 2);
        for (x, y, texel) in img.enumerate_pixels_mut() {
            *texel = if (x + y) % 2 == 0 {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([0, 0, 0, 0])
            };
        }
        img.save(temp.path().join("checker.png")).expect("save");
        let mut store = ImageStore::new(temp.path());
        store.load("checker.png").expect("load");
        store
    }

    #[test]
    fn rect_is_clipped_to_frame() {
        let mut frame = frame();
        fill_rect_clipped(
            &mut frame,
            W,
            H,
            Vector { x: -2, y: 2 },
            Size { w: 4, h: 10 },
            Color::rgba(1, 2, 3, 255),
        );

        assert_eq!(pixel(&frame, 0, 2), [1, 2, 3, 255]);
        assert_eq!(pixel(&frame, 1, 3), [1, 2, 3, 255]);
        assert_eq!(pixel(&frame, 2, 2), [0, 0, 0, 0]);
        assert_eq!(pixel(&frame, 0, 1), [0, 0, 0, 0]);
    }

    #[test]
    fn translucent_rect_blends_over_existing_pixels() {
        let mut frame = frame();
        let origin = Vector::default();
        let one = Size { w: 1, h: 1 };
        fill_rect_clipped(&mut frame, W, H, origin, one, Color::rgba(200, 0, 0, 255));
        fill_rect_clipped(&mut frame, W, H, origin, one, Color::rgba(0, 0, 200, 128));

        let [r, g, b, a] = pixel(&frame, 0, 0);
        assert!((99..=101).contains(&r), "r = {r}");
        assert_eq!(g, 0);
        assert!((99..=101).contains(&b), "b = {b}");
        assert_eq!(a, 255);
    }

    #[test]
    fn blit_scales_source_region_and_skips_transparent_texels() {
        let temp = TempDir::new().expect("temp");
        let store = checker_store(&temp);
        let image = store.get(ImageHandle(0)).expect("image");
        let mut frame = frame();

        blit_scaled_clipped(
            &mut frame,
            W,
            H,
            image,
            Vector { x: 0, y: 0 },
            Size { w: 2, h: 1 },
            Vector { x: 0, y: 0 },
            Size { w: 4, h: 2 },
        );

        assert_eq!(pixel(&frame, 0, 0), [255, 255, 255, 255]);
        assert_eq!(pixel(&frame, 1, 1), [255, 255, 255, 255]);
        assert_eq!(pixel(&frame, 2, 0), [0, 0, 0, 0]);
        assert_eq!(pixel(&frame, 3, 1), [0, 0, 0, 0]);
        assert_eq!(pixel(&frame, 4, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn draw_commands_paints_in_order_and_ignores_text() {
        let temp = TempDir::new().expect("temp");
        let store = checker_store(&temp);
        let mut list = RenderCommandList::with_capacity(4);
        list.push(RenderCommand::Rect {
            pos: Vector::default(),
            size: Size { w: 8, h: 4 },
            color: Color::rgba(168, 168, 168, 255),
        });
        list.push(RenderCommand::Pic {
            image: ImageHandle(0),
            pos: Vector { x: 4, y: 0 },
            size: Size { w: 4, h: 2 },
            src_pos: Vector::default(),
            src_size: Size { w: 4, h: 2 },
        });
        list.push(RenderCommand::Text {
            pos: Vector::default(),
            text: "ignored".to_string(),
        });
        list.push(RenderCommand::Pic {
            image: ImageHandle(9),
            pos: Vector::default(),
            size: Size { w: 8, h: 4 },
            src_pos: Vector::default(),
            src_size: Size { w: 1, h: 1 },
        });
        let mut frame = frame();

        draw_commands(&mut frame, W, H, &list, &store);

        assert_eq!(pixel(&frame, 0, 0), [168, 168, 168, 255]);
        assert_eq!(pixel(&frame, 4, 0), [255, 255, 255, 255]);
        assert_eq!(pixel(&frame, 5, 0), [168, 168, 168, 255]);
        assert_eq!(pixel(&frame, 0, 3), [168, 168, 168, 255]);
    }
}
