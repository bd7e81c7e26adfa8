//! Tools answered without touching the session.

use serde_json::json;

use super::{payload, Arguments, HandlerResult, LocalContext, ToolHandler, ToolSpec};

pub(super) const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "list_tools",
        description: "List every tool the bridge exposes with its argument schema.",
        args: &[],
        handler: ToolHandler::Local(list_tools),
        attach_snapshot: false,
    },
    ToolSpec {
        name: "get_diagnostics",
        description: "Counters for owner-thread calls, timeouts and best-effort failures \
                      (camera adjustment, snapshot capture, artifact cleanup).",
        args: &[],
        handler: ToolHandler::Local(get_diagnostics),
        attach_snapshot: false,
    },
];

fn list_tools(ctx: &LocalContext<'_>, _: &Arguments) -> HandlerResult {
    let tools = ctx.registry.definitions();
    Ok(payload(json!({
        "count": tools.len(),
        "tools": tools,
    })))
}

fn get_diagnostics(ctx: &LocalContext<'_>, _: &Arguments) -> HandlerResult {
    Ok(payload(json!({ "diagnostics": ctx.diagnostics.snapshot() })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use crate::tools::ToolRegistry;

    #[test]
    fn lists_registry() {
        let registry = ToolRegistry::builtin().unwrap();
        let diagnostics = Diagnostics::new();
        let ctx = LocalContext {
            registry: &registry,
            diagnostics: &diagnostics,
        };
        let out = list_tools(&ctx, &Arguments::default()).unwrap();
        assert_eq!(out["count"], registry.len());
        assert!(out["tools"][0]["inputSchema"].is_object());
    }

    #[test]
    fn reports_counters() {
        let registry = ToolRegistry::builtin().unwrap();
        let diagnostics = Diagnostics::new();
        diagnostics.record_timeout();
        let ctx = LocalContext {
            registry: &registry,
            diagnostics: &diagnostics,
        };
        let out = get_diagnostics(&ctx, &Arguments::default()).unwrap();
        assert_eq!(out["diagnostics"]["timeouts"], 1);
    }
}
