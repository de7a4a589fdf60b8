/// Default edge-fade range in output pixels.
pub const DEFAULT_BLENDING_RANGE: f32 = 40.0;

/// Default border (in output pixels) that receives zero blending weight.
pub const DEFAULT_BLENDING_BORDER: f32 = 0.0;

/// Default inner smoothing sigma of the content-based weights.
pub const DEFAULT_CONTENT_SIGMA1: f64 = 20.0;

/// Default outer smoothing sigma of the content-based weights.
pub const DEFAULT_CONTENT_SIGMA2: f64 = 40.0;

/// Default spacing between deformation grid nodes, in output pixels.
pub const DEFAULT_CONTROL_POINT_SPACING: [u32; 3] = [10, 10, 10];

/// Default locality parameter of the moving least squares fit.
pub const DEFAULT_ALPHA: f64 = 1.0;

/// Minimum number of reference anchors for a view to get a deformation grid.
/// Four non-coplanar points are needed to pin down a 3-D affine transform.
pub const DEFAULT_MIN_REFERENCE_POINTS: usize = 4;

/// Default exponent of the inverse distance cell blending.
pub const DEFAULT_CELL_BLEND_POWER: f64 = 2.0;

/// Support radius of the inverse distance cell blending, in grid cells.
pub const CELL_BLEND_SUPPORT: f64 = 1.5;

/// Squared distance below which a reference point is treated as coincident
/// with the query location.
pub const MLS_MIN_SQUARED_DISTANCE: f64 = 1e-8;

/// Relative determinant threshold below which the weighted point
/// covariance is considered degenerate (coplanar or collinear anchors).
pub const MLS_DEGENERATE_DETERMINANT: f64 = 1e-9;

/// Tolerance used when testing whether a local coordinate lies inside the
/// source image.
pub const INSIDE_TOLERANCE: f64 = 1e-6;

/// Tolerance used when testing affine transforms for identity.
pub const IDENTITY_TOLERANCE: f64 = 1e-6;

/// Small epsilon to avoid division by zero in floating-point comparisons.
pub const EPSILON: f32 = 1e-10;

/// Gaussian kernel radius in sigmas; convolution scratch volumes are padded
/// by the same amount.
pub const GAUSSIAN_PADDING_SIGMAS: f64 = 3.0;

/// Number of voxels sampled along each axis when approximating the
/// intensity range of a virtual volume.
pub const MIN_MAX_SAMPLES_PER_AXIS: usize = 32;

/// Minimum pixel count of a slice to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;
