use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::ImageReader;
use pixels::{Error, Pixels, SurfaceTexture};
use tracing::warn;
use winit::window::Window;

use crate::app::world::{
    Agent, Building, ModalPayload, Rgba, TileCoord, TileKind, ToastBanner, WorldState,
    TILE_SIZE_PX,
};

use super::font::{
    draw_text, draw_text_outlined, glyph_advance, line_advance, text_width_px, wrap_text,
};
use super::{frame_transform, FrameTransform, Viewport};

const BACKDROP_COLOR: Rgba = [12, 14, 18, 255];
const WORLD_FILL_COLOR: Rgba = [42, 54, 38, 255];
const GROUND_COLOR: Rgba = [84, 124, 68, 255];
const GROUND_ALT_COLOR: Rgba = [78, 116, 63, 255];
const WALL_COLOR: Rgba = [52, 58, 66, 255];
const PLAYER_BODY_COLOR: Rgba = [241, 196, 64, 255];
const COMPANION_BODY_COLOR: Rgba = [228, 230, 235, 255];
const AGENT_FACING_MARK_COLOR: Rgba = [28, 30, 34, 255];
const PLAYER_HALF_SIZE_PX: f32 = 12.0;
const COMPANION_HALF_SIZE_PX: f32 = 9.0;
const WALK_BOB_FRAMES: u32 = 4;
const BUILDING_BEVEL_WORLD_PX: f32 = 5.0;
const LABEL_FILL_COLOR: Rgba = [248, 248, 248, 255];
const LABEL_OUTLINE_COLOR: Rgba = [20, 22, 26, 255];
const LABEL_TEXT_SCALE: i32 = 2;
const LABEL_INSET_PX: i32 = 4;
const ALPHA_DRAW_THRESHOLD: u8 = 8;

const PANEL_BG_COLOR: Rgba = [14, 16, 22, 240];
const PANEL_BORDER_COLOR: Rgba = [96, 110, 130, 255];
const PANEL_TEXT_COLOR: Rgba = [244, 248, 252, 255];
const PANEL_DIM_TEXT_COLOR: Rgba = [176, 198, 220, 255];
const PANEL_TEXT_SCALE: i32 = 2;
const MODAL_MARGIN_PX: i32 = 48;
const MODAL_MAX_WIDTH_PX: i32 = 480;
const MODAL_INSET_PX: i32 = 14;
const TOAST_TOP_PX: i32 = 10;
const TOAST_INSET_PX: i32 = 8;
const TOAST_ACCENT_WIDTH_PX: i32 = 4;
const OVERLAY_PADDING_PX: i32 = 10;
const OVERLAY_INSET_PX: i32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScreenRect {
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
}

impl ScreenRect {
    fn width(self) -> i32 {
        self.right - self.left
    }

    fn height(self) -> i32 {
        self.bottom - self.top
    }
}

struct LoadedImage {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
enum ImageScaleMode {
    /// Fill the whole destination, cropping overflow.
    Cover,
    /// Fit inside the destination, centered.
    Fit,
}

pub struct Renderer {
    window: Arc<Window>,
    pixels: Pixels<'static>,
    viewport: Viewport,
    asset_root: PathBuf,
    image_cache: HashMap<String, LoadedImage>,
    warned_missing_image_keys: HashSet<String>,
}

impl Renderer {
    pub fn new(window: Arc<Window>, asset_root: PathBuf) -> Result<Self, Error> {
        let size = window.inner_size();
        let pixels = Self::build_pixels(Arc::clone(&window), size.width, size.height)?;
        Ok(Self {
            window,
            pixels,
            viewport: Viewport {
                width: size.width,
                height: size.height,
            },
            asset_root,
            image_cache: HashMap::new(),
            warned_missing_image_keys: HashSet::new(),
        })
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

    pub(crate) fn render_world(
        &mut self,
        world: &WorldState,
        modal: Option<&ModalPayload>,
        toast: Option<&ToastBanner>,
        overlay_lines: Option<&[String]>,
    ) -> Result<(), Error> {
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Ok(());
        }

        let width = self.viewport.width;
        let height = self.viewport.height;
        let frame = self.pixels.frame_mut();
        render_frame(
            frame,
            width,
            height,
            world,
            &mut self.image_cache,
            &mut self.warned_missing_image_keys,
            self.asset_root.as_path(),
        );

        if let Some(banner) = toast {
            draw_toast_banner(frame, width, height, banner);
        }
        if let Some(payload) = modal {
            draw_modal_panel(frame, width, height, payload);
        }
        if let Some(lines) = overlay_lines {
            draw_overlay_panel(frame, width, height, lines);
        }

        self.pixels.render()
    }
}

/// The world layer stack, in its one fixed order: background fill,
/// background image, tiles (plain ground under buildings), buildings,
/// companion, creatures, player. Later layers overwrite earlier ones;
/// the player is drawn last so it is never occluded.
fn render_frame(
    frame: &mut [u8],
    width: u32,
    height: u32,
    world: &WorldState,
    image_cache: &mut HashMap<String, LoadedImage>,
    warned_missing_image_keys: &mut HashSet<String>,
    asset_root: &Path,
) {
    for chunk in frame.chunks_exact_mut(4) {
        chunk.copy_from_slice(&BACKDROP_COLOR);
    }

    let viewport = Viewport { width, height };
    let transform = frame_transform(viewport, world.grid.width_px(), world.grid.height_px());
    let world_rect = ScreenRect {
        left: transform.screen_x(0.0),
        top: transform.screen_y(0.0),
        right: transform.screen_x(world.grid.width_px()),
        bottom: transform.screen_y(world.grid.height_px()),
    };
    draw_filled_rect(frame, width, height, world_rect, WORLD_FILL_COLOR);

    if let Some(key) = world.background_image_key.as_deref() {
        if let Some(background) =
            resolve_cached_image(image_cache, warned_missing_image_keys, asset_root, key)
        {
            draw_image_scaled(
                frame,
                width,
                height,
                world_rect,
                background,
                ImageScaleMode::Cover,
            );
        }
    }

    draw_tile_layer(frame, width, height, world, &transform);

    for building in &world.buildings {
        draw_building(
            frame,
            width,
            height,
            building,
            &transform,
            image_cache,
            warned_missing_image_keys,
            asset_root,
        );
    }

    draw_agent(
        frame,
        width,
        height,
        &transform,
        &world.companion,
        COMPANION_BODY_COLOR,
        COMPANION_HALF_SIZE_PX,
    );
    for creature in &world.creatures {
        draw_agent(
            frame,
            width,
            height,
            &transform,
            &creature.agent,
            creature.species.body,
            creature.species.half_size_px.max(1) as f32,
        );
    }
    draw_agent(
        frame,
        width,
        height,
        &transform,
        &world.player,
        PLAYER_BODY_COLOR,
        PLAYER_HALF_SIZE_PX,
    );
}

fn draw_tile_layer(
    frame: &mut [u8],
    width: u32,
    height: u32,
    world: &WorldState,
    transform: &FrameTransform,
) {
    for y in 0..world.grid.height() {
        for x in 0..world.grid.width() {
            let Some(tile) = world.grid.tile_at(x, y) else {
                continue;
            };
            let cell_rect = cell_screen_rect(transform, x, y);
            // Cells under a building envelope render as plain ground so the
            // merged building box is not double-drawn over wall art.
            let color = if world.cell_in_building(TileCoord { x, y }) {
                ground_color(x, y)
            } else {
                match tile {
                    TileKind::Empty => ground_color(x, y),
                    TileKind::Wall => WALL_COLOR,
                }
            };
            draw_filled_rect(frame, width, height, cell_rect, color);
        }
    }
}

fn ground_color(x: u32, y: u32) -> Rgba {
    if (x + y) % 2 == 0 {
        GROUND_COLOR
    } else {
        GROUND_ALT_COLOR
    }
}

fn cell_screen_rect(transform: &FrameTransform, x: u32, y: u32) -> ScreenRect {
    ScreenRect {
        left: transform.screen_x(x as f32 * TILE_SIZE_PX),
        top: transform.screen_y(y as f32 * TILE_SIZE_PX),
        right: transform.screen_x((x + 1) as f32 * TILE_SIZE_PX),
        bottom: transform.screen_y((y + 1) as f32 * TILE_SIZE_PX),
    }
}

#[allow(clippy::too_many_arguments)]
fn draw_building(
    frame: &mut [u8],
    width: u32,
    height: u32,
    building: &Building,
    transform: &FrameTransform,
    image_cache: &mut HashMap<String, LoadedImage>,
    warned_missing_image_keys: &mut HashSet<String>,
    asset_root: &Path,
) {
    let Some(footprint) = building.footprint_px() else {
        return;
    };
    let rect = ScreenRect {
        left: transform.screen_x(footprint.x1),
        top: transform.screen_y(footprint.y1),
        right: transform.screen_x(footprint.x2),
        bottom: transform.screen_y(footprint.y2),
    };
    if rect.width() <= 0 || rect.height() <= 0 {
        return;
    }

    if let Some(key) = building.image_key.as_deref() {
        if let Some(image) =
            resolve_cached_image(image_cache, warned_missing_image_keys, asset_root, key)
        {
            draw_image_scaled(frame, width, height, rect, image, ImageScaleMode::Fit);
            return;
        }
        // Not decodable (yet): fall through to the colored box for this frame.
    }

    draw_bevel_box(
        frame,
        width,
        height,
        rect,
        building.fill,
        building
            .fill_dark
            .unwrap_or_else(|| darken(building.fill, 0.70)),
        transform,
    );
    draw_building_label(frame, width, height, rect, building.display_label());
}

fn draw_bevel_box(
    frame: &mut [u8],
    width: u32,
    height: u32,
    rect: ScreenRect,
    fill: Rgba,
    fill_dark: Rgba,
    transform: &FrameTransform,
) {
    draw_filled_rect(frame, width, height, rect, fill);

    let bevel = transform.screen_len(BUILDING_BEVEL_WORLD_PX).max(2);
    let bottom_strip = ScreenRect {
        left: rect.left,
        top: (rect.bottom - bevel).max(rect.top),
        right: rect.right,
        bottom: rect.bottom,
    };
    let right_strip = ScreenRect {
        left: (rect.right - bevel).max(rect.left),
        top: rect.top,
        right: rect.right,
        bottom: rect.bottom,
    };
    draw_filled_rect(frame, width, height, bottom_strip, fill_dark);
    draw_filled_rect(frame, width, height, right_strip, fill_dark);
    draw_rect_outline(frame, width, height, rect, darken(fill, 0.45));
}

fn draw_building_label(
    frame: &mut [u8],
    width: u32,
    height: u32,
    rect: ScreenRect,
    label: &str,
) {
    if label.is_empty() {
        return;
    }
    let inner_width = rect.width() - LABEL_INSET_PX * 2;
    if inner_width <= 0 {
        return;
    }

    let mut scale = LABEL_TEXT_SCALE;
    let mut max_chars = (inner_width / glyph_advance(scale)).max(1) as usize;
    if max_chars < 4 && scale > 1 {
        scale = 1;
        max_chars = (inner_width / glyph_advance(scale)).max(1) as usize;
    }

    let lines = wrap_text(label, max_chars);
    if lines.is_empty() {
        return;
    }
    let text_height = lines.len() as i32 * line_advance(scale);
    let mut y = rect.top + (rect.height() - text_height) / 2;
    for line in &lines {
        let x = rect.left + (rect.width() - text_width_px(line, scale)) / 2;
        draw_text_outlined(
            frame,
            width,
            height,
            x,
            y,
            line,
            scale,
            LABEL_FILL_COLOR,
            LABEL_OUTLINE_COLOR,
        );
        y += line_advance(scale);
    }
}

fn draw_agent(
    frame: &mut [u8],
    width: u32,
    height: u32,
    transform: &FrameTransform,
    agent: &Agent,
    body: Rgba,
    half_size_world_px: f32,
) {
    let bob = if agent.is_moving && (agent.frame / WALK_BOB_FRAMES) % 2 == 1 {
        -1
    } else {
        0
    };
    let cx = transform.screen_x(agent.position.x);
    let cy = transform.screen_y(agent.position.y) + bob;
    let half = transform.screen_len(half_size_world_px).max(2);

    let body_rect = ScreenRect {
        left: cx - half,
        top: cy - half,
        right: cx + half,
        bottom: cy + half,
    };
    draw_filled_rect(frame, width, height, body_rect, body);
    draw_rect_outline(frame, width, height, body_rect, darken(body, 0.55));

    let mark_offset = agent.direction.unit_vector();
    let mark_half = (half / 3).max(1);
    let mark_cx = cx + (mark_offset.x * half as f32 * 0.55).round() as i32;
    let mark_cy = cy + (mark_offset.y * half as f32 * 0.55).round() as i32;
    let mark_rect = ScreenRect {
        left: mark_cx - mark_half,
        top: mark_cy - mark_half,
        right: mark_cx + mark_half,
        bottom: mark_cy + mark_half,
    };
    draw_filled_rect(frame, width, height, mark_rect, AGENT_FACING_MARK_COLOR);
}

fn darken(color: Rgba, factor: f32) -> Rgba {
    let factor = factor.clamp(0.0, 1.0);
    [
        (color[0] as f32 * factor) as u8,
        (color[1] as f32 * factor) as u8,
        (color[2] as f32 * factor) as u8,
        color[3],
    ]
}

fn draw_image_scaled(
    frame: &mut [u8],
    width: u32,
    height: u32,
    dest: ScreenRect,
    image: &LoadedImage,
    mode: ImageScaleMode,
) {
    if image.width == 0 || image.height == 0 || dest.width() <= 0 || dest.height() <= 0 {
        return;
    }
    let expected_rgba_len = image.width as usize * image.height as usize * 4;
    if image.rgba.len() < expected_rgba_len {
        return;
    }

    let scale_x = dest.width() as f32 / image.width as f32;
    let scale_y = dest.height() as f32 / image.height as f32;
    let scale = match mode {
        ImageScaleMode::Cover => scale_x.max(scale_y),
        ImageScaleMode::Fit => scale_x.min(scale_y),
    };
    if !(scale.is_finite() && scale > 0.0) {
        return;
    }

    let out_w = (image.width as f32 * scale).round() as i32;
    let out_h = (image.height as f32 * scale).round() as i32;
    let out_left = dest.left + (dest.width() - out_w) / 2;
    let out_top = dest.top + (dest.height() - out_h) / 2;

    let clip_left = dest.left.max(out_left).max(0);
    let clip_top = dest.top.max(out_top).max(0);
    let clip_right = dest.right.min(out_left + out_w).min(width as i32);
    let clip_bottom = dest.bottom.min(out_top + out_h).min(height as i32);
    if clip_left >= clip_right || clip_top >= clip_bottom {
        return;
    }

    let inv_scale = scale.recip();
    let frame_width = width as usize;
    for py in clip_top..clip_bottom {
        let src_y = ((py - out_top) as f32 * inv_scale).floor() as i32;
        if src_y < 0 || src_y >= image.height as i32 {
            continue;
        }
        for px in clip_left..clip_right {
            let src_x = ((px - out_left) as f32 * inv_scale).floor() as i32;
            if src_x < 0 || src_x >= image.width as i32 {
                continue;
            }
            let src_offset = (src_y as usize * image.width as usize + src_x as usize) * 4;
            let pixel = &image.rgba[src_offset..src_offset + 4];
            if pixel[3] < ALPHA_DRAW_THRESHOLD {
                continue;
            }
            write_pixel_rgba_clipped(
                frame,
                frame_width,
                px,
                py,
                [pixel[0], pixel[1], pixel[2], 255],
            );
        }
    }
}

/// Successful decodes are cached; failures are not, so an asset that lands
/// on disk later starts drawing on a subsequent frame. The warn set keeps
/// the per-frame retry quiet in the log.
fn resolve_cached_image<'a>(
    cache: &'a mut HashMap<String, LoadedImage>,
    warned_missing_image_keys: &mut HashSet<String>,
    asset_root: &Path,
    key: &str,
) -> Option<&'a LoadedImage> {
    if !cache.contains_key(key) {
        match resolve_image_path(asset_root, key) {
            Ok(path) => match load_image_rgba(&path) {
                Ok(image) => {
                    cache.insert(key.to_string(), image);
                }
                Err(reason) => {
                    warn_image_load_once(
                        warned_missing_image_keys,
                        key,
                        Some(path.as_path()),
                        reason.as_str(),
                    );
                    return None;
                }
            },
            Err(reason) => {
                warn_image_load_once(warned_missing_image_keys, key, None, reason.as_str());
                return None;
            }
        }
    }
    cache.get(key)
}

fn resolve_image_path(asset_root: &Path, key: &str) -> Result<PathBuf, String> {
    validate_image_key(key)?;
    Ok(asset_root.join("images").join(format!("{key}.png")))
}

fn validate_image_key(key: &str) -> Result<(), String> {
    if key.is_empty() || key.len() > 128 {
        return Err("invalid_key:length".to_string());
    }
    if key.starts_with('/') || key.ends_with('/') || key.contains("//") || key.contains("..") {
        return Err("invalid_key:path_shape".to_string());
    }
    if !key
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '/'))
    {
        return Err("invalid_key:charset".to_string());
    }
    Ok(())
}

fn load_image_rgba(path: &Path) -> Result<LoadedImage, String> {
    let reader = ImageReader::open(path).map_err(|error| format!("file_open_failed:{error}"))?;
    let decoded = reader
        .decode()
        .map_err(|error| format!("decode_failed:{error}"))?;
    let image = decoded.to_rgba8();
    Ok(LoadedImage {
        width: image.width(),
        height: image.height(),
        rgba: image.into_raw(),
    })
}

fn warn_image_load_once(
    warned_keys: &mut HashSet<String>,
    key: &str,
    resolved_path: Option<&Path>,
    reason: &str,
) {
    if !warned_keys.insert(key.to_string()) {
        return;
    }
    let path_display = resolved_path
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "<unresolved>".to_string());
    warn!(
        image_key = key,
        path = %path_display,
        reason = reason,
        "renderer_image_load_failed_using_fallback"
    );
}

pub(crate) fn draw_modal_panel(frame: &mut [u8], width: u32, height: u32, modal: &ModalPayload) {
    if width == 0 || height == 0 {
        return;
    }

    let panel_width = (width as i32 - MODAL_MARGIN_PX * 2).min(MODAL_MAX_WIDTH_PX);
    if panel_width <= MODAL_INSET_PX * 2 {
        return;
    }
    let inner_width = panel_width - MODAL_INSET_PX * 2;
    let max_chars = (inner_width / glyph_advance(PANEL_TEXT_SCALE)).max(1) as usize;

    let mut lines: Vec<(String, Rgba)> = Vec::new();
    if let Some(title) = modal.title.as_deref() {
        for line in wrap_text(title, max_chars) {
            lines.push((line, PANEL_DIM_TEXT_COLOR));
        }
        lines.push((String::new(), PANEL_TEXT_COLOR));
    }
    for line in wrap_text(&modal.body, max_chars) {
        lines.push((line, PANEL_TEXT_COLOR));
    }
    if !modal.links.is_empty() {
        lines.push((String::new(), PANEL_TEXT_COLOR));
        for link in &modal.links {
            for line in wrap_text(&format!("> {}", link.label), max_chars) {
                lines.push((line, PANEL_DIM_TEXT_COLOR));
            }
        }
    }
    lines.push((String::new(), PANEL_TEXT_COLOR));
    let mut footer = format!("[Enter] {}", modal.confirm_text);
    if let Some(cancel_text) = modal.cancel_text.as_deref() {
        footer.push_str(&format!("   [Esc] {cancel_text}"));
    }
    for line in wrap_text(&footer, max_chars) {
        lines.push((line, PANEL_DIM_TEXT_COLOR));
    }

    let panel_height = lines.len() as i32 * line_advance(PANEL_TEXT_SCALE) + MODAL_INSET_PX * 2;
    let panel_left = (width as i32 - panel_width) / 2;
    let panel_top = ((height as i32 - panel_height) / 2).max(0);
    let panel_rect = ScreenRect {
        left: panel_left,
        top: panel_top,
        right: panel_left + panel_width,
        bottom: panel_top + panel_height,
    };
    draw_filled_rect(frame, width, height, panel_rect, PANEL_BG_COLOR);
    draw_rect_outline(frame, width, height, panel_rect, PANEL_BORDER_COLOR);

    let mut y = panel_top + MODAL_INSET_PX;
    for (line, color) in &lines {
        draw_text(
            frame,
            width,
            height,
            panel_left + MODAL_INSET_PX,
            y,
            line,
            PANEL_TEXT_SCALE,
            *color,
        );
        y += line_advance(PANEL_TEXT_SCALE);
    }
}

pub(crate) fn draw_toast_banner(frame: &mut [u8], width: u32, height: u32, toast: &ToastBanner) {
    if width == 0 || height == 0 {
        return;
    }

    let mut banner_lines = vec![toast.headline.clone()];
    if let Some(detail) = toast.detail.as_deref() {
        banner_lines.push(detail.to_string());
    }
    let longest = banner_lines
        .iter()
        .map(|line| text_width_px(line, PANEL_TEXT_SCALE))
        .max()
        .unwrap_or(0);
    let banner_width = longest + TOAST_INSET_PX * 2 + TOAST_ACCENT_WIDTH_PX;
    let banner_height =
        banner_lines.len() as i32 * line_advance(PANEL_TEXT_SCALE) + TOAST_INSET_PX * 2;
    let left = (width as i32 - banner_width) / 2;
    let rect = ScreenRect {
        left,
        top: TOAST_TOP_PX,
        right: left + banner_width,
        bottom: TOAST_TOP_PX + banner_height,
    };
    draw_filled_rect(frame, width, height, rect, PANEL_BG_COLOR);
    draw_rect_outline(frame, width, height, rect, PANEL_BORDER_COLOR);
    let accent_rect = ScreenRect {
        left: rect.left,
        top: rect.top,
        right: rect.left + TOAST_ACCENT_WIDTH_PX,
        bottom: rect.bottom,
    };
    draw_filled_rect(frame, width, height, accent_rect, toast.accent);

    let mut y = rect.top + TOAST_INSET_PX;
    for (index, line) in banner_lines.iter().enumerate() {
        let color = if index == 0 {
            PANEL_TEXT_COLOR
        } else {
            PANEL_DIM_TEXT_COLOR
        };
        draw_text(
            frame,
            width,
            height,
            rect.left + TOAST_ACCENT_WIDTH_PX + TOAST_INSET_PX,
            y,
            line,
            PANEL_TEXT_SCALE,
            color,
        );
        y += line_advance(PANEL_TEXT_SCALE);
    }
}

pub(crate) fn draw_overlay_panel(frame: &mut [u8], width: u32, height: u32, lines: &[String]) {
    if width == 0 || height == 0 || lines.is_empty() {
        return;
    }

    let longest = lines
        .iter()
        .map(|line| text_width_px(line, PANEL_TEXT_SCALE))
        .max()
        .unwrap_or(0);
    let panel_rect = ScreenRect {
        left: OVERLAY_PADDING_PX - OVERLAY_INSET_PX,
        top: OVERLAY_PADDING_PX - OVERLAY_INSET_PX,
        right: OVERLAY_PADDING_PX + longest + OVERLAY_INSET_PX,
        bottom: OVERLAY_PADDING_PX
            + lines.len() as i32 * line_advance(PANEL_TEXT_SCALE)
            + OVERLAY_INSET_PX,
    };
    draw_filled_rect(frame, width, height, panel_rect, PANEL_BG_COLOR);
    draw_rect_outline(frame, width, height, panel_rect, PANEL_BORDER_COLOR);

    let mut y = OVERLAY_PADDING_PX;
    for line in lines {
        draw_text(
            frame,
            width,
            height,
            OVERLAY_PADDING_PX,
            y,
            line,
            PANEL_TEXT_SCALE,
            PANEL_TEXT_COLOR,
        );
        y += line_advance(PANEL_TEXT_SCALE);
    }
}

fn draw_filled_rect(frame: &mut [u8], width: u32, height: u32, rect: ScreenRect, color: Rgba) {
    let start_x = rect.left.max(0);
    let start_y = rect.top.max(0);
    let end_x = rect.right.min(width as i32);
    let end_y = rect.bottom.min(height as i32);
    if end_x <= start_x || end_y <= start_y {
        return;
    }

    let width_usize = width as usize;
    for py in start_y..end_y {
        for px in start_x..end_x {
            write_pixel_rgba_clipped(frame, width_usize, px, py, color);
        }
    }
}

fn draw_rect_outline(frame: &mut [u8], width: u32, height: u32, rect: ScreenRect, color: Rgba) {
    if rect.width() <= 1 || rect.height() <= 1 {
        return;
    }
    let top = ScreenRect {
        left: rect.left,
        top: rect.top,
        right: rect.right,
        bottom: rect.top + 1,
    };
    let bottom = ScreenRect {
        left: rect.left,
        top: rect.bottom - 1,
        right: rect.right,
        bottom: rect.bottom,
    };
    let left = ScreenRect {
        left: rect.left,
        top: rect.top,
        right: rect.left + 1,
        bottom: rect.bottom,
    };
    let right = ScreenRect {
        left: rect.right - 1,
        top: rect.top,
        right: rect.right,
        bottom: rect.bottom,
    };
    draw_filled_rect(frame, width, height, top, color);
    draw_filled_rect(frame, width, height, bottom, color);
    draw_filled_rect(frame, width, height, left, color);
    draw_filled_rect(frame, width, height, right, color);
}

fn write_pixel_rgba_clipped(frame: &mut [u8], width: usize, x: i32, y: i32, color: Rgba) {
    if x < 0 || y < 0 {
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
    frame[byte_offset..end].copy_from_slice(&color);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::world::{Creature, CreatureSpecies, TileGrid, Vec2};

    const TEST_SIZE: u32 = 192; // 6 tiles at scale 1

    fn test_world() -> WorldState {
        let grid = TileGrid::new(6, 6, vec![TileKind::Empty; 36]).expect("grid");
        WorldState::new(
            grid,
            Vec2 {
                x: 3.0 * TILE_SIZE_PX,
                y: 3.0 * TILE_SIZE_PX,
            },
        )
    }

    fn render_offscreen(world: &WorldState) -> Vec<u8> {
        let mut frame = vec![0u8; (TEST_SIZE * TEST_SIZE * 4) as usize];
        let mut cache = HashMap::new();
        let mut warned = HashSet::new();
        render_frame(
            &mut frame,
            TEST_SIZE,
            TEST_SIZE,
            world,
            &mut cache,
            &mut warned,
            Path::new("/nonexistent-assets"),
        );
        frame
    }

    fn pixel_at(frame: &[u8], x: i32, y: i32) -> Rgba {
        let offset = (y as usize * TEST_SIZE as usize + x as usize) * 4;
        [
            frame[offset],
            frame[offset + 1],
            frame[offset + 2],
            frame[offset + 3],
        ]
    }

    fn test_species() -> CreatureSpecies {
        CreatureSpecies {
            name: "cat".to_string(),
            body: [120, 90, 60, 255],
            half_size_px: 8,
            speed_factor: 1.0,
            wander_min_px: 16.0,
            wander_max_px: 64.0,
            timer_min_s: 1.0,
            timer_max_s: 2.0,
        }
    }

    fn test_building(cells: Vec<TileCoord>) -> Building {
        Building {
            id: "hall".to_string(),
            label: "Hall".to_string(),
            route: "/hall".to_string(),
            cells,
            fill: [170, 80, 70, 255],
            fill_dark: None,
            image_key: None,
            auto_navigate: false,
            banner: None,
        }
    }

    #[test]
    fn player_pixels_survive_forced_overlap_with_creature_and_building() {
        let mut world = test_world();
        let overlap = world.player.position;
        world.buildings.push(test_building(vec![
            TileCoord { x: 2, y: 2 },
            TileCoord { x: 3, y: 3 },
        ]));
        world.creatures.push(Creature {
            agent: Agent::at(overlap),
            species: test_species(),
        });
        world.companion.position = overlap;

        let frame = render_offscreen(&world);
        let center = pixel_at(&frame, overlap.x as i32, overlap.y as i32);
        assert_eq!(center, PLAYER_BODY_COLOR);
    }

    #[test]
    fn building_renders_as_merged_box_without_image() {
        let mut world = test_world();
        world.player.position = Vec2 { x: 16.0, y: 16.0 };
        world.companion.position = world.player.position;
        world.buildings.push(test_building(vec![
            TileCoord { x: 3, y: 1 },
            TileCoord { x: 4, y: 2 },
        ]));

        let frame = render_offscreen(&world);
        // The envelope spans cells (3,1)..(4,2); probe a point inside it that
        // no occupied cell covers directly (the merged box fills the gap).
        let probe = pixel_at(&frame, 3 * 32 + 16, 2 * 32 + 4);
        assert_ne!(probe, GROUND_COLOR);
        assert_ne!(probe, GROUND_ALT_COLOR);
    }

    #[test]
    fn empty_footprint_building_renders_nothing_and_does_not_panic() {
        let mut world = test_world();
        world.buildings.push(test_building(Vec::new()));
        let frame = render_offscreen(&world);
        assert_eq!(frame.len(), (TEST_SIZE * TEST_SIZE * 4) as usize);
    }

    #[test]
    fn missing_background_image_falls_back_to_fill() {
        let mut world = test_world();
        world.background_image_key = Some("missing/backdrop".to_string());
        let frame = render_offscreen(&world);
        // Ground checker still visible where nothing else draws.
        let corner = pixel_at(&frame, 4, 4);
        assert!(corner == GROUND_COLOR || corner == GROUND_ALT_COLOR);
    }

    #[test]
    fn wall_tiles_render_distinct_from_ground() {
        let grid = {
            let mut tiles = vec![TileKind::Empty; 36];
            tiles[0] = TileKind::Wall;
            TileGrid::new(6, 6, tiles).expect("grid")
        };
        let mut world = WorldState::new(
            grid,
            Vec2 {
                x: 3.0 * TILE_SIZE_PX,
                y: 3.0 * TILE_SIZE_PX,
            },
        );
        world.companion.position = world.player.position;
        let frame = render_offscreen(&world);
        assert_eq!(pixel_at(&frame, 4, 4), WALL_COLOR);
    }

    #[test]
    fn tiles_under_building_envelope_render_as_ground() {
        let grid = {
            let mut tiles = vec![TileKind::Empty; 36];
            tiles[2 * 6 + 2] = TileKind::Wall;
            TileGrid::new(6, 6, tiles).expect("grid")
        };
        let mut world = WorldState::new(grid, Vec2 { x: 16.0, y: 16.0 });
        world.companion.position = world.player.position;
        // Building covers the wall cell; bevel box paints over it, so just
        // assert the wall color never shows at the cell center.
        world
            .buildings
            .push(test_building(vec![TileCoord { x: 2, y: 2 }]));
        let frame = render_offscreen(&world);
        assert_ne!(pixel_at(&frame, 2 * 32 + 16, 2 * 32 + 16), WALL_COLOR);
    }

    #[test]
    fn image_misses_are_not_cached_so_late_assets_can_appear() {
        let mut cache = HashMap::new();
        let mut warned = HashSet::new();
        let result = resolve_cached_image(&mut cache, &mut warned, Path::new("/nope"), "bg/sky");
        assert!(result.is_none());
        assert!(cache.is_empty());
        assert!(warned.contains("bg/sky"));
    }

    #[test]
    fn image_key_validation_rejects_traversal_and_bad_charset() {
        assert!(validate_image_key("buildings/town-hall").is_ok());
        assert!(validate_image_key("../etc/passwd").is_err());
        assert!(validate_image_key("/absolute").is_err());
        assert!(validate_image_key("with space").is_err());
        assert!(validate_image_key("").is_err());
    }

    #[test]
    fn modal_and_toast_chrome_draw_without_panic_on_tiny_frames() {
        let mut frame = vec![0u8; 32 * 32 * 4];
        let modal = ModalPayload {
            title: Some("Notice".to_string()),
            body: "A long body line that needs wrapping several times over".to_string(),
            confirm_text: "OK".to_string(),
            cancel_text: Some("Close".to_string()),
            links: vec![],
        };
        draw_modal_panel(&mut frame, 32, 32, &modal);
        let toast = ToastBanner {
            headline: "Town Hall".to_string(),
            detail: Some("Press E to enter".to_string()),
            accent: [200, 120, 40, 255],
        };
        draw_toast_banner(&mut frame, 32, 32, &toast);
        draw_overlay_panel(&mut frame, 32, 32, &["fps 60".to_string()]);
    }
}
