pub mod consts;
pub mod dataset;
pub mod deform;
pub mod error;
pub mod fusion;
pub mod io;
pub mod landmarks;
pub mod registration;
pub mod sample;
pub mod transform;
pub mod view;
pub mod volume;
pub mod weights;
