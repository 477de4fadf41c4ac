//! Per-request view specification.
//!
//! A [`ViewSpec`] captures the requested region (as fractions of the full
//! image), the output size, rotation, mirroring, colourspace and the size
//! restrictions in force. It also derives the pyramid resolution to decode
//! from: the smallest level whose region still meets the requested output
//! size.
//!
//! Resolutions are numbered from the coarse end (`0` = smallest level,
//! `L-1` = full resolution) while the descriptor's dimension arrays are
//! indexed from the fine end; [`ViewSpec::level_index`] converts.

use crate::source::ImageDescriptor;

/// Mirroring applied after rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flip {
    #[default]
    None,
    Horizontal,
    Vertical,
}

/// Output colourspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Colourspace {
    #[default]
    Native,
    Greyscale,
}

/// Normalized description of the requested view.
#[derive(Debug, Clone)]
pub struct ViewSpec {
    view_left: f64,
    view_top: f64,
    view_width: f64,
    view_height: f64,
    viewport_set: bool,

    /// Requested output width in pixels
    pub requested_width: u32,

    /// Requested output height in pixels
    pub requested_height: u32,

    /// Rotation in degrees, one of 0/90/180/270
    pub rotation: u16,

    pub flip: Flip,
    pub colourspace: Colourspace,
    pub bitonal: bool,

    /// Largest sample edge this request may be served at (0 = unrestricted)
    pub max_sample_size: u32,

    /// Preserve the region aspect ratio in the output
    pub maintain_aspect: bool,

    /// Hard output cap from configuration (0 = unlimited)
    pub max_size: u32,

    /// Serve output larger than the decoded region
    pub allow_upscaling: bool,

    /// Horizontal viewing angle for image sequences
    pub xangle: i32,

    /// Vertical viewing angle for image stacks
    pub yangle: i32,

    num_levels: usize,
    level_widths: Vec<u32>,
    level_heights: Vec<u32>,
}

impl Default for ViewSpec {
    fn default() -> Self {
        Self {
            view_left: 0.0,
            view_top: 0.0,
            view_width: 1.0,
            view_height: 1.0,
            viewport_set: false,
            requested_width: 0,
            requested_height: 0,
            rotation: 0,
            flip: Flip::None,
            colourspace: Colourspace::Native,
            bitonal: false,
            max_sample_size: 0,
            maintain_aspect: true,
            max_size: 0,
            allow_upscaling: true,
            xangle: 0,
            yangle: 90,
            num_levels: 0,
            level_widths: Vec::new(),
            level_heights: Vec::new(),
        }
    }
}

impl ViewSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the spec to an opened image's pyramid.
    pub fn set_image(&mut self, descriptor: &ImageDescriptor) {
        self.num_levels = descriptor.levels();
        self.level_widths = descriptor.level_widths.clone();
        self.level_heights = descriptor.level_heights.clone();
    }

    // =========================================================================
    // Viewport
    // =========================================================================

    pub fn set_view_left(&mut self, v: f64) {
        self.view_left = v.clamp(0.0, 1.0);
        self.viewport_set = true;
    }

    pub fn set_view_top(&mut self, v: f64) {
        self.view_top = v.clamp(0.0, 1.0);
        self.viewport_set = true;
    }

    pub fn set_view_width(&mut self, v: f64) {
        self.view_width = v.clamp(0.0, 1.0 - self.view_left).max(f64::MIN_POSITIVE);
        self.viewport_set = true;
    }

    pub fn set_view_height(&mut self, v: f64) {
        self.view_height = v.clamp(0.0, 1.0 - self.view_top).max(f64::MIN_POSITIVE);
        self.viewport_set = true;
    }

    pub fn view_left(&self) -> f64 {
        self.view_left
    }

    pub fn view_top(&self) -> f64 {
        self.view_top
    }

    pub fn view_width(&self) -> f64 {
        self.view_width
    }

    pub fn view_height(&self) -> f64 {
        self.view_height
    }

    /// Whether any viewport setter was called (a `full` region leaves the
    /// defaults untouched).
    pub fn viewport_set(&self) -> bool {
        self.viewport_set
    }

    /// Set rotation, normalising 360 to 0.
    pub fn set_rotation(&mut self, degrees: u16) {
        self.rotation = degrees % 360;
    }

    // =========================================================================
    // Size Limits
    // =========================================================================

    /// The output cap in force for this request: the smaller of the
    /// configured maximum and the per-image sample restriction.
    pub fn effective_max_size(&self) -> u32 {
        match (self.max_size, self.max_sample_size) {
            (0, 0) => 0,
            (0, s) => s,
            (m, 0) => m,
            (m, s) => m.min(s),
        }
    }

    // =========================================================================
    // Resolution Selection
    // =========================================================================

    /// Number of pyramid levels of the bound image.
    pub fn num_levels(&self) -> usize {
        self.num_levels
    }

    /// Convert a resolution number (0 = coarsest) into an index of the
    /// descriptor's dimension arrays (0 = finest).
    pub fn level_index(&self, resolution: usize) -> usize {
        self.num_levels - 1 - resolution
    }

    /// Choose the resolution to decode from.
    ///
    /// Returns the largest resolution number whose level region still
    /// meets or exceeds the requested output size, i.e. the smallest
    /// usable level. An `oversampling` factor above 1.0 inflates the
    /// requirement, admitting at most one level finer than strictly
    /// needed. When even the full image cannot satisfy the request the
    /// finest resolution is returned; whether the result is then upscaled
    /// is decided by [`ViewSpec::output_size`].
    pub fn resolution(&self, oversampling: f32) -> usize {
        debug_assert!(self.num_levels > 0, "resolution() before set_image()");
        let need_w = self.requested_width as f64 * oversampling.max(1.0) as f64;
        let need_h = self.requested_height as f64 * oversampling.max(1.0) as f64;

        for idx in (0..self.num_levels).rev() {
            let w = (self.level_widths[idx] as f64 * self.view_width).floor();
            let h = (self.level_heights[idx] as f64 * self.view_height).floor();
            if w >= need_w && h >= need_h {
                return self.num_levels - 1 - idx;
            }
        }
        self.num_levels - 1
    }

    /// Pixel rectangle of the viewport at a level of the given dimensions.
    ///
    /// The rectangle is clamped to the level so edge regions stay valid,
    /// and never collapses below one pixel.
    pub fn region_at(&self, level_width: u32, level_height: u32) -> (u32, u32, u32, u32) {
        let x0 = (self.view_left * level_width as f64).floor() as u32;
        let y0 = (self.view_top * level_height as f64).floor() as u32;
        let x1 = ((self.view_left + self.view_width) * level_width as f64).ceil() as u32;
        let y1 = ((self.view_top + self.view_height) * level_height as f64).ceil() as u32;

        let x0 = x0.min(level_width.saturating_sub(1));
        let y0 = y0.min(level_height.saturating_sub(1));
        let w = x1.min(level_width).saturating_sub(x0).max(1);
        let h = y1.min(level_height).saturating_sub(y0).max(1);
        (x0, y0, w, h)
    }

    /// Final output dimensions given the decoded region size.
    ///
    /// When upscaling is disallowed and the request exceeds the region,
    /// both axes are scaled down by the same factor so the aspect policy
    /// is preserved.
    pub fn output_size(&self, region_width: u32, region_height: u32) -> (u32, u32) {
        let (mut w, mut h) = (self.requested_width, self.requested_height);
        if w == 0 || h == 0 {
            return (region_width, region_height);
        }
        if !self.allow_upscaling && (w > region_width || h > region_height) {
            let fx = region_width as f64 / w as f64;
            let fy = region_height as f64 / h as f64;
            let f = fx.min(fy);
            w = ((w as f64 * f).round() as u32).max(1);
            h = ((h as f64 * f).round() as u32).max(1);
        }
        (w.max(1), h.max(1))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// A spec bound to a synthetic three-level pyramid 4096/1024/256 wide.
    fn spec_with_levels() -> ViewSpec {
        let mut spec = ViewSpec::new();
        spec.num_levels = 3;
        spec.level_widths = vec![4096, 1024, 256];
        spec.level_heights = vec![3072, 768, 192];
        spec
    }

    #[test]
    fn test_default_viewport_is_full() {
        let spec = ViewSpec::new();
        assert_eq!(spec.view_left(), 0.0);
        assert_eq!(spec.view_width(), 1.0);
        assert!(!spec.viewport_set());
        assert_eq!(spec.yangle, 90);
    }

    #[test]
    fn test_viewport_clamped() {
        let mut spec = ViewSpec::new();
        spec.set_view_left(0.5);
        spec.set_view_width(0.9);
        assert!(spec.view_left() + spec.view_width() <= 1.0 + 1e-9);
        assert!(spec.viewport_set());
    }

    #[test]
    fn test_resolution_picks_smallest_sufficient_level() {
        let mut spec = spec_with_levels();
        spec.requested_width = 200;
        spec.requested_height = 150;
        // The 256x192 level covers 200x150: coarsest resolution (0)
        assert_eq!(spec.resolution(1.0), 0);

        spec.requested_width = 800;
        spec.requested_height = 600;
        // Needs the 1024x768 level
        assert_eq!(spec.resolution(1.0), 1);

        spec.requested_width = 2000;
        spec.requested_height = 1500;
        assert_eq!(spec.resolution(1.0), 2);
    }

    #[test]
    fn test_resolution_accounts_for_region_fraction() {
        let mut spec = spec_with_levels();
        spec.set_view_left(0.0);
        spec.set_view_top(0.0);
        spec.set_view_width(0.25);
        spec.set_view_height(0.25);
        spec.requested_width = 200;
        spec.requested_height = 150;
        // A quarter of 1024 is 256 >= 200, but a quarter of 256 is only 64
        assert_eq!(spec.resolution(1.0), 1);
    }

    #[test]
    fn test_resolution_oversampling_steps_one_finer() {
        let mut spec = spec_with_levels();
        spec.requested_width = 200;
        spec.requested_height = 150;
        assert_eq!(spec.resolution(1.0), 0);
        // 256 < 200*2, so a factor of 2 pushes to the next finer level
        assert_eq!(spec.resolution(2.0), 1);
    }

    #[test]
    fn test_resolution_request_beyond_full_uses_finest() {
        let mut spec = spec_with_levels();
        spec.requested_width = 9000;
        spec.requested_height = 7000;
        assert_eq!(spec.resolution(1.0), 2);
    }

    #[test]
    fn test_level_index_conversion() {
        let spec = spec_with_levels();
        assert_eq!(spec.level_index(0), 2); // coarsest resolution, last index
        assert_eq!(spec.level_index(2), 0); // finest resolution, first index
    }

    #[test]
    fn test_region_at_full_view() {
        let spec = spec_with_levels();
        assert_eq!(spec.region_at(1024, 768), (0, 0, 1024, 768));
    }

    #[test]
    fn test_region_at_fraction() {
        let mut spec = ViewSpec::new();
        spec.set_view_left(0.125);
        spec.set_view_top(0.0);
        spec.set_view_width(0.75);
        spec.set_view_height(1.0);
        assert_eq!(spec.region_at(4096, 3072), (512, 0, 3072, 3072));
    }

    #[test]
    fn test_region_at_clamps_to_edges() {
        let mut spec = ViewSpec::new();
        spec.set_view_left(0.9);
        spec.set_view_top(0.9);
        spec.set_view_width(0.2);
        spec.set_view_height(0.2);
        let (x, y, w, h) = spec.region_at(1000, 1000);
        assert!(x + w <= 1000);
        assert!(y + h <= 1000);
        assert!(w >= 1 && h >= 1);
    }

    #[test]
    fn test_output_size_upscaling_allowed() {
        let mut spec = ViewSpec::new();
        spec.requested_width = 800;
        spec.requested_height = 600;
        spec.allow_upscaling = true;
        assert_eq!(spec.output_size(400, 300), (800, 600));
    }

    #[test]
    fn test_output_size_upscaling_denied() {
        let mut spec = ViewSpec::new();
        spec.requested_width = 800;
        spec.requested_height = 600;
        spec.allow_upscaling = false;
        assert_eq!(spec.output_size(400, 300), (400, 300));
    }

    #[test]
    fn test_effective_max_size() {
        let mut spec = ViewSpec::new();
        assert_eq!(spec.effective_max_size(), 0);

        spec.max_size = 5000;
        assert_eq!(spec.effective_max_size(), 5000);

        spec.max_sample_size = 600;
        assert_eq!(spec.effective_max_size(), 600);

        spec.max_size = 0;
        assert_eq!(spec.effective_max_size(), 600);
    }

    #[test]
    fn test_rotation_normalised() {
        let mut spec = ViewSpec::new();
        spec.set_rotation(360);
        assert_eq!(spec.rotation, 0);
        spec.set_rotation(270);
        assert_eq!(spec.rotation, 270);
    }
}
