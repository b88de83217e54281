//! Serve the demo site under `demo/`.
//!
//! ```sh
//! RUST_LOG=flatearth_core=debug cargo run -p flatearth-server --example basic_markdown
//! ```

use std::path::Path;

use flatearth_core::{App, ContentGenerator, ExtensionHost, TopicExtension};
use flatearth_server::{ServerConfig, init_tracing, serve};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing(1);

    let demo = Path::new(env!("CARGO_MANIFEST_DIR")).join("demo");
    let templates = demo.join("templates").join("**").join("*.html");
    let mut app = App::new(&templates.to_string_lossy())?;

    let mut generator = ContentGenerator::markdown()?
        .search_path(demo.join("pages"))
        .init_app(&app)
        .extension(ExtensionHost::set_up(TopicExtension::new()))?
        .build()?;
    generator.generate(&mut app)?;

    for warning in generator.diagnostics().warnings() {
        println!("warning: {warning}");
    }

    let config = ServerConfig {
        port: 8080,
        static_dir: Some(demo.join("static")),
        ..Default::default()
    };
    serve(&app, config).await
}
