//! Collaborators for pagewise.
//!
//! This crate provides the page fetchers and the text-completion client used
//! by the pipeline, behind the [`PageFetcher`] and [`CompletionClient`] traits.

pub mod completion;
pub mod fetch;

#[cfg(feature = "render")]
pub mod render;

pub use completion::{
    CompletionClient, CompletionConfig, CompletionError, OpenAiCompletionClient, build_prompt, extract_json_object,
    parse_answer, render_template,
};
pub use fetch::{FetchConfig, FetchError, FetchedPage, HttpPageFetcher, PageFetcher, extract_page};

#[cfg(feature = "render")]
pub use render::HeadlessPageFetcher;
