// Copyright: Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Removal of the attribution is not allowed, as covered under the AGPL license

#![deny(
    clippy::mutable_key_type,
    clippy::map_entry,
    clippy::boxed_local,
    clippy::let_unit_value,
    clippy::redundant_allocation,
    clippy::bool_comparison,
    clippy::bind_instead_of_map,
    clippy::vec_box,
    clippy::while_let_loop,
    clippy::useless_asref,
    clippy::repeat_once,
    clippy::deref_addrof,
    clippy::suspicious_map,
    clippy::single_char_pattern,
    clippy::for_kv_map,
    clippy::let_and_return,
    clippy::iter_nth,
    clippy::iter_cloned_collect,
    clippy::match_result_ok,
    clippy::cmp_owned,
    clippy::op_ref
)]

//! Schematic grid simplification: station merging, grid compaction, weight tables,
//! proportional line sizing and the convergence loop that ties them together.

pub mod config;
pub mod convergence;
pub mod errors;
pub mod grid_compaction;
pub mod grid_model;
pub mod guided_merge;
pub mod line_sizing;
pub mod station_merge;
pub mod topology;
pub mod weight_table;


pub use errors::SchematicError;
pub use grid_model::{
    Axis, GridDocument, GridMeta, GridPoint, Layout, NodeProperties, NodeType, Outcome, Route,
    Segment, WeightInterval,
};
