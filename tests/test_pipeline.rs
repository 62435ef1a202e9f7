use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use vigil::handler::{Handler, Next, Pipeline, handler_fn};
use vigil::http::context::Context;
use vigil::http::method::Method;
use vigil::http::request::RequestBuilder;
use vigil::http::response::{Response, StatusCode};

type Trace = Arc<Mutex<Vec<String>>>;

/// Records entry and exit around the rest of the chain.
struct Recorder {
    name: &'static str,
    trace: Trace,
}

#[async_trait]
impl Handler for Recorder {
    async fn handle(&self, ctx: &mut Context, next: Next<'_>) -> anyhow::Result<()> {
        self.trace.lock().unwrap().push(format!("{} in", self.name));
        next.run(ctx).await?;
        self.trace.lock().unwrap().push(format!("{} out", self.name));
        Ok(())
    }
}

struct ShortCircuit;

#[async_trait]
impl Handler for ShortCircuit {
    async fn handle(&self, ctx: &mut Context, _next: Next<'_>) -> anyhow::Result<()> {
        ctx.set_response(Response::not_found());
        Ok(())
    }
}

struct Failing;

#[async_trait]
impl Handler for Failing {
    async fn handle(&self, _ctx: &mut Context, _next: Next<'_>) -> anyhow::Result<()> {
        anyhow::bail!("handler exploded")
    }
}

fn context() -> Context {
    Context::new(
        RequestBuilder::new(Method::Get, "/").build(),
        "10.0.0.1:5000".parse().unwrap(),
    )
}

fn recorder(name: &'static str, trace: &Trace) -> Arc<dyn Handler> {
    Arc::new(Recorder {
        name,
        trace: trace.clone(),
    })
}

#[tokio::test]
async fn test_handlers_run_in_registration_order() {
    let trace = Trace::default();
    let pipeline = Pipeline::new(vec![recorder("a", &trace), recorder("b", &trace)]);

    pipeline.run(&mut context()).await.unwrap();

    assert_eq!(*trace.lock().unwrap(), ["a in", "b in", "b out", "a out"]);
}

#[tokio::test]
async fn test_short_circuit_skips_the_rest() {
    let trace = Trace::default();
    let pipeline = Pipeline::new(vec![
        recorder("outer", &trace),
        Arc::new(ShortCircuit),
        recorder("never", &trace),
    ]);
    let mut ctx = context();

    pipeline.run(&mut ctx).await.unwrap();

    assert_eq!(*trace.lock().unwrap(), ["outer in", "outer out"]);
    assert_eq!(ctx.response().unwrap().status, StatusCode::NotFound);
}

#[tokio::test]
async fn test_wrapper_can_rewrite_response() {
    let stamp: Arc<dyn Handler> = Arc::new(handler_fn(|ctx, next| {
        Box::pin(async move {
            next.run(ctx).await?;
            if let Some(response) = ctx.response_mut() {
                response.headers.append("X-Stamped", "yes");
            }
            Ok(())
        })
    }));
    let pipeline = Pipeline::new(vec![stamp, Arc::new(ShortCircuit)]);
    let mut ctx = context();

    pipeline.run(&mut ctx).await.unwrap();

    assert_eq!(ctx.response().unwrap().headers.get("x-stamped"), Some("yes"));
}

#[tokio::test]
async fn test_error_propagates_to_caller() {
    let trace = Trace::default();
    let pipeline = Pipeline::new(vec![recorder("a", &trace), Arc::new(Failing)]);

    let err = pipeline.run(&mut context()).await.unwrap_err();

    assert_eq!(err.to_string(), "handler exploded");
    assert_eq!(*trace.lock().unwrap(), ["a in"]);
}

#[tokio::test]
async fn test_handlers_share_typed_state() {
    struct Authenticated(&'static str);

    let login: Arc<dyn Handler> = Arc::new(handler_fn(|ctx, next| {
        Box::pin(async move {
            ctx.state_mut().insert(Authenticated("alice"));
            next.run(ctx).await
        })
    }));
    let greet: Arc<dyn Handler> = Arc::new(handler_fn(|ctx, _next| {
        Box::pin(async move {
            let user = ctx.state().get::<Authenticated>().map(|a| a.0).unwrap_or("nobody");
            ctx.set_response(Response::ok(format!("hi {user}")));
            Ok(())
        })
    }));
    let mut ctx = context();

    Pipeline::new(vec![login, greet]).run(&mut ctx).await.unwrap();

    assert_eq!(ctx.response().unwrap().headers.get("content-length"), Some("8"));
}
