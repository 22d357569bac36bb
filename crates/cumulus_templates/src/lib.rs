//! # cumulus_templates
//!
//! Template rendering and reference resolution for cumulus.
//!
//! A template goes through three steps:
//!
//! - Expansion by the engine implied by its extension (`.mako` scripts, `.jinja`/`.j2` Tera, plain `.yaml`/`.json`)
//! - Loading as YAML, resolving reference tags (`!Cloudformation`, `!SSM`, `!AWS`, `!ARM`, `!GCPDM`)
//! - Output synthesis for every entry under `Resources`
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cumulus_providers::{ProviderContext, ProviderOptions};
//! use cumulus_templates::{ReferenceResolver, TemplateEngine, TemplateRenderer};
//!
//! let providers = ProviderContext::from_options(ProviderOptions::default())?;
//! let renderer = TemplateRenderer::new(Arc::new(ReferenceResolver::new(providers)));
//!
//! let source = "Resources:\n  topic:\n    Type: AWS::SNS::Topic\n";
//! let template = renderer
//!     .render("alerts", source, &Default::default(), TemplateEngine::Yaml)
//!     .unwrap();
//! assert!(template.get("Outputs").is_some());
//! # Ok::<(), cumulus_providers::ProviderError>(())
//! ```

pub mod engine;
pub mod error;
pub mod fetch;
pub mod outputs;
pub mod renderer;
pub mod resolver;
pub mod script;
pub mod tags;
pub mod tera_engine;

pub use engine::TemplateEngine;
pub use error::{TemplateError, TemplateResult};
pub use fetch::TemplateFetcher;
pub use outputs::synthesize_outputs;
pub use renderer::TemplateRenderer;
pub use resolver::{Reference, ReferenceResolver};
pub use tags::{TagParser, TagRegistry};
