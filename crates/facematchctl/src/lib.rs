//! Facematch Control library - command implementations behind `facematchctl`

pub mod commands;
pub mod display;
