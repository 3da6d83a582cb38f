//!
//! Request-side tool rewriting per model family.
//!
//! Families with native tool support (OpenAI, Anthropic) keep their tool
//! definitions, which the Argo converter then emits in the family's wire
//! shape. Families without reliable native support (Google, unknown) get a
//! prompting-based rewrite instead: a synthesised system preamble describes
//! every tool and instructs the model to answer with tagged
//! `<tool_call>{…}</tool_call>` blocks, and the structured `tools` /
//! `tool_choice` fields are removed from the upstream request.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::fmt::Write;

use tracing::debug;

use crate::ir::{ContentPart, IrMessage, IrRequest, Role, ToolChoice, ToolDefinition};
use crate::models::ModelFamily;

/* --- start of code -------------------------------------------------------------------------- */

///
/// Rewrite the request's tools for the target model family.
///
/// # Arguments
///  * `ir` - request in IR form, modified in place
///  * `family` - wire-format family of the resolved model
///  * `native_tools` - configuration default for families that support
///    native tools; Google and unknown families always use prompting
pub fn rewrite_tools(ir: &mut IrRequest, family: ModelFamily, native_tools: bool) {
    let has_tools = ir.tools.as_ref().map(|t| !t.is_empty()).unwrap_or(false);
    if !has_tools {
        return;
    }

    let use_native = match family {
        ModelFamily::OpenAi | ModelFamily::Anthropic => native_tools,
        ModelFamily::Google | ModelFamily::Unknown => false,
    };

    if use_native {
        debug!("Passing {} tool(s) through natively for {} family",
            ir.tools.as_ref().map(Vec::len).unwrap_or(0), family.as_str());
        return;
    }

    let tools = ir.tools.take().unwrap_or_default();
    let choice = ir.tool_choice.take();
    let preamble = build_tool_preamble(&tools, choice.as_ref());

    // Merge into an existing leading system message, or synthesise one.
    match ir.messages.iter_mut().find(|m| m.role == Role::System) {
        Some(system) => {
            let existing = system.joined_text();
            let combined =
                if existing.is_empty() { preamble } else { format!("{}\n\n{}", existing, preamble) };
            system.content = vec![ContentPart::Text { text: combined }];
        }
        None => {
            ir.messages.insert(0, IrMessage::text(Role::System, preamble));
        }
    }
    debug!("Rewrote {} tool(s) into prompting-based preamble", tools.len());
}

///
/// Build the system preamble describing the available tools.
pub fn build_tool_preamble(tools: &[ToolDefinition], choice: Option<&ToolChoice>) -> String {
    let mut out = String::from("You have access to the following tools:\n");

    for tool in tools {
        let _ = write!(out, "\nTool: {}\n", tool.name);
        if let Some(description) = &tool.description {
            let _ = write!(out, "Description: {}\n", description);
        }
        let _ = write!(out, "Parameters (JSON Schema): {}\n", tool.parameters);
    }

    out.push_str(
        "\nTo call a tool, emit a block of exactly this form in your reply:\n\
         <tool_call>{\"name\": \"<tool name>\", \"arguments\": {<arguments object>}}</tool_call>\n\
         Use one block per call and valid JSON inside the block. \
         Do not mention the tool syntax otherwise.",
    );

    match choice {
        Some(ToolChoice::Required) => {
            out.push_str("\nYou must call at least one tool before answering.");
        }
        Some(ToolChoice::Specific { name }) => {
            let _ = write!(out, "\nYou must call the tool \"{}\".", name);
        }
        Some(ToolChoice::None) => {
            out.push_str("\nDo not call any tool for this request.");
        }
        _ => {}
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request_with_tools() -> IrRequest {
        IrRequest {
            messages: vec![IrMessage::text(Role::User, "What's the weather?")],
            tools: Some(vec![ToolDefinition {
                name: "get_weather".into(),
                description: Some("Look up weather".into()),
                parameters: json!({"type": "object", "properties": {"location": {"type": "string"}}}),
            }]),
            tool_choice: Some(ToolChoice::Auto),
            ..Default::default()
        }
    }

    #[test]
    fn test_native_families_keep_tools() {
        let mut ir = request_with_tools();
        rewrite_tools(&mut ir, ModelFamily::OpenAi, true);
        assert!(ir.tools.is_some());
        assert_eq!(ir.messages.len(), 1);

        let mut ir = request_with_tools();
        rewrite_tools(&mut ir, ModelFamily::Anthropic, true);
        assert!(ir.tools.is_some());
    }

    #[test]
    fn test_google_family_gets_preamble() {
        let mut ir = request_with_tools();
        rewrite_tools(&mut ir, ModelFamily::Google, true);
        assert!(ir.tools.is_none());
        assert!(ir.tool_choice.is_none());
        assert_eq!(ir.messages[0].role, Role::System);
        let preamble = ir.messages[0].joined_text();
        assert!(preamble.contains("Tool: get_weather"));
        assert!(preamble.contains("<tool_call>"));
    }

    #[test]
    fn test_unknown_family_defaults_to_prompting() {
        let mut ir = request_with_tools();
        rewrite_tools(&mut ir, ModelFamily::Unknown, true);
        assert!(ir.tools.is_none());
        assert_eq!(ir.messages[0].role, Role::System);
    }

    #[test]
    fn test_native_tools_disabled_forces_prompting() {
        let mut ir = request_with_tools();
        rewrite_tools(&mut ir, ModelFamily::OpenAi, false);
        assert!(ir.tools.is_none());
        assert_eq!(ir.messages[0].role, Role::System);
    }

    #[test]
    fn test_preamble_merges_into_existing_system_message() {
        let mut ir = request_with_tools();
        ir.messages.insert(0, IrMessage::text(Role::System, "Be helpful."));
        rewrite_tools(&mut ir, ModelFamily::Google, true);
        assert_eq!(ir.messages.len(), 2);
        let system = ir.messages[0].joined_text();
        assert!(system.starts_with("Be helpful."));
        assert!(system.contains("Tool: get_weather"));
    }

    #[test]
    fn test_specific_choice_noted_in_preamble() {
        let mut ir = request_with_tools();
        ir.tool_choice = Some(ToolChoice::Specific { name: "get_weather".into() });
        rewrite_tools(&mut ir, ModelFamily::Google, true);
        assert!(ir.messages[0].joined_text().contains("must call the tool \"get_weather\""));
    }

    #[test]
    fn test_no_tools_is_untouched() {
        let mut ir = IrRequest {
            messages: vec![IrMessage::text(Role::User, "Hi")],
            ..Default::default()
        };
        rewrite_tools(&mut ir, ModelFamily::Google, true);
        assert_eq!(ir.messages.len(), 1);
    }
}
