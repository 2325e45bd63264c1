// This module provides thin helpers over raw ash calls.

pub mod command_encoder;
pub mod enumerate;
pub mod util;
