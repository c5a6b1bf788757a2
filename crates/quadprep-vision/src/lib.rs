// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// quadprep-vision: quadrat detection plus lens and perspective correction.
//
// Every stage is a pure function over image buffers. `detect_quadrat`,
// `undistort` and `correct_perspective` are the entry points used by the
// export worker and the CLI.

pub mod contour;
pub mod corners;
pub mod detect;
pub mod hough;
pub mod io;
pub mod lens;
pub mod overlay;
pub mod perspective;
pub mod preprocess;

pub use detect::{DetectionSource, QuadratDetectionResult, detect_quadrat, order_corners};
pub use io::{decode_image, encode_png, load_image, save_image};
pub use lens::{LensModel, undistort, undistort_photo};
pub use perspective::correct_perspective;
