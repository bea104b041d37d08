use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use clap::Parser as ClapParser;

use chj_util::{info, warn};
use codebehind::config::Config;
use codebehind::controller::{Controller, ControllerClass, ControllerFactory, Page, Partial,
                             ServerEvent};
use codebehind::loader::{MissingSource, ModuleDir};
use codebehind::router::Router;
use codebehind::server::{run_server, worker_pool};
use codebehind::view::FileViews;
use codebehind::Codebehind;


// ------------------------------------------------------------------
// Demo controllers

#[derive(Default)]
struct Home;

impl Controller for Home {
    fn start(&mut self, page: &mut Page) -> anyhow::Result<()> {
        page.set_text("greeting", "Who's there?")?;
        Ok(())
    }
}

impl Home {
    fn greet(&mut self, page: &mut Page, _event: &ServerEvent, (): ())
             -> anyhow::Result<()> {
        let name = page.value("name").unwrap_or("").trim().to_owned();
        if name.is_empty() {
            page.set_text("greeting", "Please enter a name.")?;
        } else {
            page.set_text("greeting", &format!("Hello, {name}!"))?;
        }
        Ok(())
    }
}

#[derive(Default)]
struct Counter;

impl Controller for Counter {}

impl Counter {
    /// The count lives in the page: a server-bound input the panel
    /// posts back.
    fn add(&mut self, page: &mut Page, _event: &ServerEvent, (step,): (Option<i64>,))
           -> anyhow::Result<i64> {
        let n: i64 = page.value("count").unwrap_or("0").parse().unwrap_or(0);
        let n = n + step.unwrap_or(1);
        page.set_value("count", &n.to_string())?;
        page.set_text("shown", &n.to_string())?;
        Ok(n)
    }
}

/// Handlers any page can call from script.
fn echoing<C: Controller>() -> Partial<C> {
    Partial::new("Echo")
        .handler("echo", |_c: &mut C, _page: &mut Page, _event: &ServerEvent,
                 args: Vec<serde_json::Value>| Ok(args))
        .handlers_all_api()
}

fn home_class() -> Arc<dyn ControllerFactory> {
    ControllerClass::<Home>::with_default("Home")
        .title("Codebehind demo")
        .view("home")
        .handler("greet", Home::greet)
        .include(&echoing())
        .build()
}

fn counter_class() -> Arc<dyn ControllerFactory> {
    ControllerClass::<Counter>::with_default("Counter")
        .title("Counter")
        .view("counter")
        .handler("add", Counter::add)
        .build()
}


// ------------------------------------------------------------------

#[derive(clap::Parser, Debug)]
/// Serve codebehind views. Options override the `CODEBEHIND_*`
/// environment variables.
struct Args {
    /// Address to listen on
    #[clap(long)]
    listen: Option<String>,

    /// Directory holding the views
    #[clap(long)]
    views: Option<String>,

    /// Serve `<views>/<path>.<ext>` for unrouted paths
    #[clap(long)]
    make_routes: bool,

    /// Don't load the controllers at startup
    #[clap(long)]
    no_preload: bool,

    /// Number of worker threads
    #[clap(long)]
    workers: Option<usize>,
}

impl Args {
    fn apply(self, config: &mut Config) {
        if let Some(listen) = self.listen {
            config.listen_addr = listen;
        }
        if let Some(views) = self.views {
            config.views_dir = views.into();
        }
        if self.make_routes {
            config.make_routes = true;
        }
        if self.no_preload {
            config.preload = false;
        }
        if let Some(workers) = self.workers {
            config.worker_threads = workers;
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")).init();

    let mut config = Config::from_env()?;
    Args::parse().apply(&mut config);

    let views = FileViews::new(&config.views_dir, &config.view_extension);
    if !views.dir().is_dir() {
        bail!("views directory {:?} does not exist", views.dir());
    }
    let (home, counter) = (home_class(), counter_class());
    let mut router = Router::new().make_routes(config.make_routes);
    // Attached, so that `serverEvents` calls from the pages reach
    // their API handlers.
    router
        .attach("/", home.clone())?
        .attach("/counter", counter.clone())?;
    let controllers = ModuleDir::new("demo")
        .controller(home)
        .controller(counter)
        .partial(echoing::<Home>());

    let app = Arc::new(Codebehind::new(
        config.clone(),
        Arc::new(views),
        Arc::new(controllers),
        Some(Arc::new(MissingSource("builtin".into())))));

    let pool = worker_pool(config.worker_threads);
    if config.preload {
        let report = app.preload(&pool);
        if report.failed() > 0 {
            warn!("{} of {} controllers failed to load", report.failed(),
                  report.outcomes.len());
        }
    }

    info!("listening on {}", config.listen_addr);
    let http_thread = run_server("codebehind_http", config.listen_addr.clone(),
                                 app, Arc::new(router), pool)?;
    http_thread.join().map_err(|_| anyhow!("http thread panicked"))?;
    bail!("Server stopped.");
}
