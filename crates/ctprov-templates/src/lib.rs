mod error;
mod materialize;

pub use error::TemplateError;
pub use materialize::{
    materialize, materialize_with_runner, remove_rendered, rendered_path, MaterializeOutcome,
    RenderContext, TemplateResource,
};

#[cfg(test)]
mod tests;
