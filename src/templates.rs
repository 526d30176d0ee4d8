use std::sync::Arc;

use minijinja::Environment;
use serde::Serialize;

// Embedded at compile time.
const TEMPLATES: &[(&str, &str)] = &[
    ("layout.html", include_str!("../templates/layout.html")),
    ("index.html", include_str!("../templates/index.html")),
    ("signin.html", include_str!("../templates/signin.html")),
    ("signup.html", include_str!("../templates/signup.html")),
    ("error.html", include_str!("../templates/error.html")),
    ("topic/new.html", include_str!("../templates/topic/new.html")),
    ("topic/show.html", include_str!("../templates/topic/show.html")),
    ("topic/edit.html", include_str!("../templates/topic/edit.html")),
];

/// Templates
///
/// The server-side view layer: a minijinja environment holding every page template.
/// `.html` names are auto-escaped. Cheap to clone; the environment is shared.
#[derive(Clone)]
pub struct Templates {
    env: Arc<Environment<'static>>,
}

impl Templates {
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        for &(name, source) in TEMPLATES {
            env.add_template(name, source)?;
        }
        Ok(Self { env: Arc::new(env) })
    }

    /// Renders the named template with the given context.
    pub fn render<S: Serialize>(&self, name: &str, ctx: S) -> Result<String, minijinja::Error> {
        self.env.get_template(name)?.render(ctx)
    }
}
