pub mod locale;
mod pdf;
pub mod pipeline;
pub mod render;

pub use locale::{ConfigError, LocaleBundle, LocaleNotFound, Registry};
pub use pipeline::{run, Config, LocaleError, OutputWriteError, PipelineError, Report, Week};
pub use render::{render, RenderError, RenderOptions, RenderedDocument};
