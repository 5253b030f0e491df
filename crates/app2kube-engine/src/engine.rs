//! Values template engine based on MiniJinja
//!
//! Every values source is rendered as a template before it is parsed as YAML.
//! Templates see no data context: they compute from the registered functions
//! (notably `env()`) and filters only.

use minijinja::{Environment, UndefinedBehavior};

use crate::error::{EngineError, Result, TemplateError};
use crate::filters;
use crate::functions;

/// The values template engine; undefined names are always errors
pub struct Engine {
    env: Environment<'static>,
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            env: create_environment(),
        }
    }
}

impl Engine {
    /// Render one values source
    ///
    /// Content without any template markers is returned unchanged, so plain
    /// YAML never goes through the renderer.
    pub fn render_values(&self, content: &str, source_name: &str) -> Result<String> {
        if !has_template_markers(content) {
            return Ok(content.to_string());
        }

        self.env
            .render_named_str(source_name, content, minijinja::context! {})
            .map_err(|e| {
                EngineError::Template(TemplateError::from_minijinja(e, source_name, content))
            })
    }
}

fn has_template_markers(content: &str) -> bool {
    content.contains("{{") || content.contains("{%") || content.contains("{#")
}

fn create_environment() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_keep_trailing_newline(true);

    env.add_filter("toyaml", filters::toyaml);
    env.add_filter("tojson", filters::tojson);
    env.add_filter("b64encode", filters::b64encode);
    env.add_filter("b64decode", filters::b64decode);
    env.add_filter("quote", filters::quote);
    env.add_filter("squote", filters::squote);
    env.add_filter("nindent", filters::nindent);
    env.add_filter("indent", filters::indent);
    env.add_filter("required", filters::required);
    env.add_filter("empty", filters::empty);
    env.add_filter("sha256", filters::sha256sum);
    env.add_filter("trunc", filters::trunc);
    env.add_filter("trimprefix", filters::trimprefix);
    env.add_filter("trimsuffix", filters::trimsuffix);
    env.add_filter("snakecase", filters::snakecase);
    env.add_filter("kebabcase", filters::kebabcase);

    env.add_function("env", functions::env);
    env.add_function("fail", functions::fail);
    env.add_function("dict", functions::dict);
    env.add_function("list", functions::list);
    env.add_function("get", functions::get);
    env.add_function("coalesce", functions::coalesce);
    env.add_function("ternary", functions::ternary);
    env.add_function("uuidv4", functions::uuidv4);
    env.add_function("tostring", functions::tostring);
    env.add_function("toint", functions::toint);
    env.add_function("tofloat", functions::tofloat);
    env.add_function("now", functions::now);
    env.add_function("printf", functions::printf);

    env
}
