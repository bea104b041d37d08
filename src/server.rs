//! The HTTP side: rouille requests in, rouille responses out.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use rouille::{Request, Response, Server};
use scoped_thread_pool::Pool;
use serde_json::{json, Value};

use chj_util::{info, time_guard, warn};

use crate::engine::RenderOutcome;
use crate::error;
use crate::in_threadpool::in_threadpool;
use crate::request::{HttpMethod, RequestContext};
use crate::router::{Handled, Router};
use crate::url_encoding::parse_query;
use crate::webutils::{errorpage_from_status, html_response, json_response, HttpStatus};
use crate::descriptor::PartialResponse;
use crate::Codebehind;

fn content_type(request: &Request) -> &str {
    request.header("Content-Type").unwrap_or("")
}

/// Extract what the engine needs, reading the body.
pub fn request_context(request: &Request) -> Result<RequestContext> {
    let mut ctx = RequestContext::new(HttpMethod::from_str(request.method()), &request.url());
    ctx.query = parse_query(request.raw_query_string())?;
    let ct = content_type(request);
    if ct.starts_with("application/json") {
        let body: Value = rouille::input::json_input(request)
            .context("reading JSON body")?;
        ctx = ctx.with_json_body(body);
    } else if ct.starts_with("application/x-www-form-urlencoded") {
        let fields = rouille::input::post::raw_urlencoded_post_input(request)
            .context("reading form body")?;
        for (k, v) in fields {
            ctx.body.insert(k, Value::String(v));
        }
    }
    Ok(ctx)
}

fn page_response(result: error::Result<RenderOutcome>, expects_partial: bool) -> Response {
    match result {
        Ok(RenderOutcome::Html(html)) | Ok(RenderOutcome::PassThrough(html)) =>
            html_response(HttpStatus::Ok200, html),
        Ok(RenderOutcome::Partial(partial)) =>
            json_response(HttpStatus::Ok200, &partial),
        Ok(RenderOutcome::Composed(page)) => match page.finish() {
            Ok(html) => html_response(HttpStatus::Ok200, html),
            Err(e) => {
                warn!("finishing page: {e}");
                errorpage_from_status(HttpStatus::InternalServerError500)
            }
        },
        Err(e) if expects_partial => {
            // The client script reports failures from the payload.
            json_response(HttpStatus::Ok200, &PartialResponse::failure(e.client_message()))
        }
        Err(e) => {
            warn!("{e}");
            errorpage_from_status(HttpStatus::InternalServerError500)
        }
    }
}

/// Route and render, mapping the outcome to a response.
pub fn respond(app: &Codebehind, router: &Router, ctx: RequestContext) -> Response {
    let expects_partial = ctx.expects_partial();
    match router.dispatch(app, ctx) {
        Some(Handled::Page(result)) => page_response(result, expects_partial),
        Some(Handled::Api(Ok(value))) => json_response(HttpStatus::Ok200, &value),
        Some(Handled::Api(Err(e))) => {
            warn!("{e}");
            json_response(HttpStatus::InternalServerError500,
                          &json!({ "error": e.client_message() }))
        }
        None => errorpage_from_status(HttpStatus::NotFound404)
    }
}

/// Make a handler for Rouille's `start_server` procedure.
pub fn server_handler(
    app: Arc<Codebehind>,
    router: Arc<Router>,
    threadpool: Arc<Pool>,
) -> impl for<'r> Fn(&'r Request) -> Response
{
    move |request: &Request| -> Response {
        time_guard!("server_handler");
        let response = match request_context(request) {
            Ok(ctx) => {
                let app = app.clone();
                let router = router.clone();
                in_threadpool(threadpool.clone(), move || respond(&app, &router, ctx))
                    .unwrap_or_else(|e| {
                        warn!("{e}");
                        errorpage_from_status(HttpStatus::InternalServerError500)
                    })
            }
            Err(e) => {
                warn!("bad request {:?}: {e:#}", request.raw_url());
                errorpage_from_status(HttpStatus::InternalServerError500)
            }
        };
        info!("{} {} {} {}", request.remote_addr(), request.method(), request.raw_url(),
              response.status_code);
        response
    }
}

/// The worker pool requests are rendered in.
pub fn worker_pool(threads: usize) -> Arc<Pool> {
    let cfg = scoped_thread_pool::ThreadConfig::new()
        .prefix("codebehind_worker");
    Arc::new(Pool::with_thread_config(threads.max(1), cfg))
}

/// Run a rouille server in a new thread, rendering in `threadpool`.
pub fn run_server(
    thread_name: &str,
    addr: String,
    app: Arc<Codebehind>,
    router: Arc<Router>,
    threadpool: Arc<Pool>,
) -> Result<JoinHandle<()>, std::io::Error>
{
    thread::Builder::new().name(thread_name.into()).spawn(move || {
        let handler = server_handler(app, router, threadpool);
        // Panicking instead of returning Result, it's run in a
        // dedicated thread where that achieves the same outcome.
        Server::new(addr, handler)
            .expect("error starting server")
            .run()
    })
}
