//! Example: wiring a small plugin host
//!
//! Command handlers are collected from several registrations, the chat
//! service and the command router depend on each other through traits, and
//! a timing advisor intercepts every routed command.

use std::sync::Arc;
use std::time::Instant;

use wirework_core::container::{ConstructorStrategy, SupplierStrategy};
use wirework_core::proxy::{FnAdvisor, Invocation};
use wirework_core::{
    Advice, ApplicationContextBuilder, ComponentCollection, ComponentKey, CompositionResult,
    Injectable, MethodSignature, ProxyHandle, ResolutionContext,
};

trait CommandHandler: Send + Sync {
    fn name(&self) -> &str;
    fn handle(&self, args: &str) -> String;
}

struct WikiHandler;

impl CommandHandler for WikiHandler {
    fn name(&self) -> &str {
        "wiki"
    }

    fn handle(&self, args: &str) -> String {
        format!("wiki page for '{}'", args)
    }
}

struct PlotHandler;

impl CommandHandler for PlotHandler {
    fn name(&self) -> &str {
        "plot"
    }

    fn handle(&self, args: &str) -> String {
        format!("plot {} claimed", args)
    }
}

trait Router: Send + Sync {
    fn route(&self, line: &str) -> CompositionResult<String>;
}

const ROUTE: MethodSignature = MethodSignature::new("Router", "route");

struct RouterProxy {
    handle: ProxyHandle<dyn Router>,
}

impl Router for RouterProxy {
    fn route(&self, line: &str) -> CompositionResult<String> {
        let owned = line.to_string();
        self.handle.try_invoke(&ROUTE, &[&owned], |router| router.route(line))
    }
}

trait Chat: Send + Sync {
    fn format(&self, message: &str) -> CompositionResult<String>;
    fn receive(&self, line: &str) -> CompositionResult<String>;
}

const FORMAT: MethodSignature = MethodSignature::new("Chat", "format");
const RECEIVE: MethodSignature = MethodSignature::new("Chat", "receive");

struct ChatProxy {
    handle: ProxyHandle<dyn Chat>,
}

impl Chat for ChatProxy {
    fn format(&self, message: &str) -> CompositionResult<String> {
        let owned = message.to_string();
        self.handle.try_invoke(&FORMAT, &[&owned], |chat| chat.format(message))
    }

    fn receive(&self, line: &str) -> CompositionResult<String> {
        let owned = line.to_string();
        self.handle.try_invoke(&RECEIVE, &[&owned], |chat| chat.receive(line))
    }
}

struct CommandRouter {
    handlers: ComponentCollection<dyn CommandHandler>,
    chat: Arc<dyn Chat>,
}

impl Injectable for CommandRouter {
    fn create(ctx: &ResolutionContext<'_>) -> CompositionResult<Self> {
        Ok(Self {
            handlers: ctx.collect::<dyn CommandHandler>()?,
            chat: ctx.get::<dyn Chat>()?,
        })
    }
}

impl Router for CommandRouter {
    fn route(&self, line: &str) -> CompositionResult<String> {
        let (command, args) = line.split_once(' ').unwrap_or((line, ""));
        let reply = self
            .handlers
            .iter()
            .find(|handler| handler.name() == command)
            .map(|handler| handler.handle(args))
            .unwrap_or_else(|| format!("unknown command '{}'", command));
        self.chat.format(&reply)
    }
}

/// Sends chat lines and routes the ones starting with '/'
struct ChatService {
    prefix: String,
    router: Arc<dyn Router>,
}

impl Chat for ChatService {
    fn format(&self, message: &str) -> CompositionResult<String> {
        Ok(format!("{} {}", self.prefix, message))
    }

    fn receive(&self, line: &str) -> CompositionResult<String> {
        match line.strip_prefix('/') {
            Some(command) => self.router.route(command),
            None => self.format(line),
        }
    }
}

impl Injectable for ChatService {
    fn create(ctx: &ResolutionContext<'_>) -> CompositionResult<Self> {
        Ok(Self {
            prefix: ctx.get_named::<String>("chat-prefix")?.to_string(),
            router: ctx.get::<dyn Router>()?,
        })
    }
}

fn main() -> CompositionResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter("wirework_core=debug")
        .init();

    let context = ApplicationContextBuilder::new()
        .proxy_type::<dyn Router, _>(|handle| Arc::new(RouterProxy { handle }) as Arc<dyn Router>)
        .proxy_type::<dyn Chat, _>(|handle| Arc::new(ChatProxy { handle }) as Arc<dyn Chat>)
        .bind_member::<dyn CommandHandler, _>(
            SupplierStrategy::new(|_ctx| Ok(Arc::new(WikiHandler) as Arc<dyn CommandHandler>)).singleton(),
            10,
        )
        .bind_member::<dyn CommandHandler, _>(
            SupplierStrategy::new(|_ctx| Ok(Arc::new(PlotHandler) as Arc<dyn CommandHandler>)).singleton(),
            0,
        )
        .bind_named::<String, _>(
            "chat-prefix",
            SupplierStrategy::new(|_ctx| Ok(Arc::new("[server]".to_string()))),
            0,
        )
        .bind::<dyn Router, _>(
            ComponentKey::of::<dyn Router>(),
            ConstructorStrategy::<dyn Router, CommandRouter>::as_interface(|router| router as Arc<dyn Router>)
                .singleton(),
            0,
        )
        .bind::<dyn Chat, _>(
            ComponentKey::of::<dyn Chat>(),
            ConstructorStrategy::<dyn Chat, ChatService>::as_interface(|chat| chat as Arc<dyn Chat>).singleton(),
            0,
        )
        .eager_singletons(true)
        .build()?;

    context.advisors_for::<dyn Router>()?.add_advisor(FnAdvisor::new(
        "timing",
        0,
        |invocation: &Invocation<'_, dyn Router>| {
            let started = Instant::now();
            let reply = invocation.proceed_as::<String>()?;
            tracing::info!(method = %invocation.method(), elapsed = ?started.elapsed(), "routed");
            Ok(Advice::value(reply))
        },
    ))?;

    let chat = context.get::<dyn Chat>()?;
    for line in ["hello everyone", "/wiki rust", "/plot 12,40", "/weather"] {
        println!("{}", chat.receive(line)?);
    }

    println!("{}", context.diagnostics()?.render_tree());
    context.shutdown()
}
