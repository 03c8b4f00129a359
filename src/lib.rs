// Copyright (c) 2017-2018, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Motion estimation core for an MPEG-family video encoder.
//!
//! For every 16x16 macroblock of a picture the core picks a candidate
//! macroblock type (intra, inter, four-vector, interlaced field pair,
//! forward/backward/bidirectional/direct for B pictures) and the motion
//! vectors minimizing a rate-distortion-like cost against one or two
//! reference pictures. After a picture has been searched, helpers pick the
//! best vector range exponent and clamp or reclassify out-of-range vectors.
//!
//! The core is driven one macroblock at a time, in raster order; vectors
//! committed for one macroblock serve as spatial predictors for the next.
//! Pixel interpolation and block comparison run through caller-replaceable
//! kernel tables.

pub mod frame;
pub mod mc;
pub mod me;
pub mod me_cmp;
mod me_search;
pub mod util;

use std::sync::Arc;

use bitflags::bitflags;
use thiserror::Error;

use crate::me_cmp::{LAMBDA_SCALE, QP2LAMBDA};

pub use crate::frame::{Frame, Plane};
pub use crate::mc::{HpelDsp, MotionVector, QpelDsp};
pub use crate::me::{
  estimate_b_frame_motion, estimate_p_frame_motion, fix_long_mvs,
  fix_long_p_mvs, get_best_fcode, pre_estimate_p_frame_motion,
  MotionEstContext, MvTable,
};
pub use crate::me_cmp::{CmpMode, CmpSelector, MeCmpContext};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MeError {
  #[error("search map is too small for the shape-adaptive diamond size")]
  ConfigInvalid,
  #[error("comparison function {0:?} is not available")]
  UnsupportedCmp(CmpMode),
}

bitflags! {
  /// Candidate macroblock types produced by the search; the later mode
  /// decision picks among the set bits.
  pub struct MbType: u32 {
    const INTRA      = 1 << 0;
    const INTER      = 1 << 1;
    const INTER4V    = 1 << 2;
    const SKIPPED    = 1 << 3;
    const DIRECT     = 1 << 4;
    const FORWARD    = 1 << 5;
    const BACKWARD   = 1 << 6;
    const BIDIR      = 1 << 7;
    const DIRECT0    = 1 << 8;
    const FORWARD_I  = 1 << 9;
    const BACKWARD_I = 1 << 10;
    const BIDIR_I    = 1 << 11;
    const INTER_I    = 1 << 12;
  }
}

bitflags! {
  /// Codec feature flags affecting the search.
  pub struct CodecFlags: u32 {
    const QPEL          = 1 << 0;
    const FOUR_MV       = 1 << 1;
    const INTERLACED_ME = 1 << 2;
  }
}

bitflags! {
  pub struct MpvFlags: u32 {
    /// Always consider the zero vector as a skip candidate.
    const MV0 = 1 << 0;
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecId {
  H261,
  H263,
  Mpeg1,
  Mpeg2,
  Mpeg4,
  Msmpeg4,
}

/// Header-level family the codec belongs to; H.263-style codecs use median
/// vector prediction, MPEG-1-style ones predict from the left neighbour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutFormat {
  H261,
  Mpeg1,
  H263,
}

impl CodecId {
  pub fn out_format(self) -> OutFormat {
    match self {
      CodecId::H261 => OutFormat::H261,
      CodecId::Mpeg1 | CodecId::Mpeg2 => OutFormat::Mpeg1,
      _ => OutFormat::H263,
    }
  }

  pub fn is_msmpeg4(self) -> bool {
    self == CodecId::Msmpeg4
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PictType {
  I,
  P,
  B,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MbDecision {
  Simple,
  Bits,
  Rd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionEstMethod {
  Zero,
  Epzs,
  Xone,
}

/// Caller-set configuration, fixed for the lifetime of the context.
#[derive(Debug, Clone)]
pub struct MeConfig {
  pub codec: CodecId,
  pub me_pre_cmp: CmpSelector,
  pub me_cmp: CmpSelector,
  pub me_sub_cmp: CmpSelector,
  pub mb_cmp: CmpSelector,
  /// Full-pel refinement pattern: 0/1 small diamond, >=2 variable diamond
  /// of that radius, negative shape-adaptive diamond of that many minima.
  pub dia_size: i32,
  pub pre_dia_size: i32,
  /// Maximum vector search range in pixels, 0 for unlimited.
  pub me_range: i32,
  pub mv0_threshold: i32,
  pub me_subpel_quality: u8,
  /// Bidirectional refinement effort, 0..=4.
  pub bidir_refine: u8,
  pub mb_decision: MbDecision,
  pub flags: CodecFlags,
  pub mpv_flags: MpvFlags,
  pub quarter_sample: bool,
  pub unrestricted_mv: bool,
  pub motion_est: MotionEstMethod,
  pub intra_penalty: i32,
  pub strict_std_compliance: bool,
}

impl Default for MeConfig {
  fn default() -> Self {
    MeConfig {
      codec: CodecId::Mpeg4,
      me_pre_cmp: CmpSelector::default(),
      me_cmp: CmpSelector::default(),
      me_sub_cmp: CmpSelector::default(),
      mb_cmp: CmpSelector::default(),
      dia_size: 0,
      pre_dia_size: 0,
      me_range: 0,
      mv0_threshold: 256,
      me_subpel_quality: 8,
      bidir_refine: 1,
      mb_decision: MbDecision::Simple,
      flags: CodecFlags::empty(),
      mpv_flags: MpvFlags::empty(),
      quarter_sample: false,
      unrestricted_mv: false,
      motion_est: MotionEstMethod::Epzs,
      intra_penalty: 0,
      strict_std_compliance: true,
    }
  }
}

/// Per-picture constants the search reads.
#[derive(Debug, Clone)]
pub struct FrameInvariants {
  pub width: usize,
  pub height: usize,
  pub mb_width: usize,
  pub mb_height: usize,
  pub mb_stride: usize,
  pub b8_stride: usize,
  pub mb_num: usize,
  pub linesize: usize,
  pub uvlinesize: usize,
  pub pict_type: PictType,
  pub f_code: u8,
  pub b_code: u8,
  pub lambda: u32,
  pub lambda2: u32,
  pub qscale: u32,
  /// Distance between the surrounding reference pictures of a B picture.
  pub pp_time: i32,
  /// Distance from the previous reference to the B picture itself.
  pub pb_time: i32,
  pub no_rounding: bool,
  pub start_mb_y: usize,
  pub end_mb_y: usize,
}

impl FrameInvariants {
  pub fn new(width: usize, height: usize, frame: &Frame) -> Self {
    let mb_width = (width + 15) / 16;
    let mb_height = (height + 15) / 16;
    let qscale = 4u32;
    let lambda = qscale * QP2LAMBDA;
    let lambda2 = (lambda * lambda + LAMBDA_SCALE / 2) >> 7;
    FrameInvariants {
      width,
      height,
      mb_width,
      mb_height,
      mb_stride: mb_width + 1,
      b8_stride: mb_width * 2 + 1,
      mb_num: mb_width * mb_height,
      linesize: frame.planes[0].cfg.stride,
      uvlinesize: frame.planes[1].cfg.stride,
      pict_type: PictType::P,
      f_code: 1,
      b_code: 1,
      lambda,
      lambda2,
      qscale,
      pp_time: 2,
      pb_time: 1,
      no_rounding: false,
      start_mb_y: 0,
      end_mb_y: mb_height,
    }
  }
}

/// A reconstructed reference picture together with the side data direct
/// mode and temporal prediction read from it.
pub struct ReferenceFrame {
  pub frame: Arc<Frame>,
  /// Committed vectors on the 8x8 grid.
  pub motion_val: MvTable,
  /// Final macroblock types of the reference.
  pub mb_type: Vec<MbType>,
  /// Macroblocks the reference coded as skipped.
  pub mbskip_table: Vec<bool>,
}

impl ReferenceFrame {
  pub fn new(fi: &FrameInvariants, frame: Arc<Frame>) -> Self {
    let mb_size = fi.mb_stride * fi.mb_height;
    ReferenceFrame {
      frame,
      motion_val: MvTable::b8_level(fi),
      mb_type: vec![MbType::empty(); mb_size],
      mbskip_table: vec![false; mb_size],
    }
  }
}

/// Per-picture mutable state: the pictures under consideration and the
/// tables the search writes. Exactly one entry per macroblock is written
/// into each table used by the current picture type.
pub struct FrameState {
  /// Picture being encoded.
  pub new_pic: Arc<Frame>,
  /// Forward reference.
  pub last_pic: Arc<Frame>,
  /// Backward reference, present for B pictures.
  pub next_pic: Option<ReferenceFrame>,

  pub p_mv_table: MvTable,
  pub b_forw_mv_table: MvTable,
  pub b_back_mv_table: MvTable,
  pub b_bidir_forw_mv_table: MvTable,
  pub b_bidir_back_mv_table: MvTable,
  pub b_direct_mv_table: MvTable,
  /// `[block][field_select]`
  pub p_field_mv_table: [[MvTable; 2]; 2],
  /// `[direction][block][field_select]`
  pub b_field_mv_table: [[[MvTable; 2]; 2]; 2],
  pub p_field_select_table: [Vec<u8>; 2],
  pub b_field_select_table: [[Vec<u8>; 2]; 2],

  /// Candidate type bitmask per macroblock.
  pub mb_type: Vec<MbType>,
  pub mb_mean: Vec<u8>,
  pub mb_var: Vec<u16>,
  pub mc_mb_var: Vec<u16>,

  /// Vectors of the picture being encoded, on the 8x8 grid; written during
  /// the search and read back as spatial predictors.
  pub cur_motion_val: MvTable,
  /// Final type of the current picture's macroblocks; the search only
  /// writes it when it commits intra outright.
  pub cur_mb_type: Vec<MbType>,
}

impl FrameState {
  pub fn new(
    fi: &FrameInvariants, new_pic: Arc<Frame>, last_pic: Arc<Frame>,
    next_pic: Option<ReferenceFrame>,
  ) -> Self {
    let mb_size = fi.mb_stride * fi.mb_height;
    let mb_table = || MvTable::mb_level(fi);
    let select = || vec![0u8; mb_size];
    FrameState {
      new_pic,
      last_pic,
      next_pic,
      p_mv_table: mb_table(),
      b_forw_mv_table: mb_table(),
      b_back_mv_table: mb_table(),
      b_bidir_forw_mv_table: mb_table(),
      b_bidir_back_mv_table: mb_table(),
      b_direct_mv_table: mb_table(),
      p_field_mv_table: [[mb_table(), mb_table()], [mb_table(), mb_table()]],
      b_field_mv_table: [
        [[mb_table(), mb_table()], [mb_table(), mb_table()]],
        [[mb_table(), mb_table()], [mb_table(), mb_table()]],
      ],
      p_field_select_table: [select(), select()],
      b_field_select_table: [[select(), select()], [select(), select()]],
      mb_type: vec![MbType::empty(); mb_size],
      mb_mean: vec![0; mb_size],
      mb_var: vec![0; mb_size],
      mc_mb_var: vec![0; mb_size],
      cur_motion_val: MvTable::b8_level(fi),
      cur_mb_type: vec![MbType::empty(); mb_size],
    }
  }
}
