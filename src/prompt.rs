//! System prompt assembly.
//!
//! Pure string concatenation in a fixed block order so identical inputs
//! always produce identical prompts.

use serde_json::Value;

/// Assemble the system prompt from bot identity, server metadata, and the
/// available tool descriptions.
pub fn build_system_prompt(
    bot_name: &str,
    server_info: &Value,
    tool_schemas: &[Value],
    tool_instructions: &[String],
) -> String {
    let name = {
        let trimmed = bot_name.trim();
        if trimmed.is_empty() { "Assistant" } else { trimmed }
    };

    let persona = format!(
        "You are {name}, a helpful Discord bot. \
         Respond in a warm, human-like tone. Keep replies short and conversational, \
         ideally under two sentences. Be clear and helpful, avoid long texts, and only \
         include necessary details. If the user message lacks a direct question, offer \
         brief, relevant guidance."
    );

    let server = format!(
        "Server Information (JSON):\n{}",
        serde_json::to_string_pretty(server_info).unwrap_or_else(|_| "{}".into())
    );

    let contract = "Response Contract:\n\
        - Always return JSON matching: { message: { content: string }, tool?: { name: string, arguments: object } | null }\n\
        - If no tool is needed, set tool to null or omit it.\n\
        - Use only the tools described below and validate arguments against the given JSON Schemas.";

    let tooling_policy = "Tool Usage Policy:\n\
        - Consider a tool call when external, current, or source-backed information is required.\n\
        - Do not call tools for conversational, opinionated, or self-contained questions.\n\
        - When calling a tool, set tool.name and tool.arguments to valid values.\n\
        - Do not invent tools or parameters that are not in the schemas.";

    let tools_block = if tool_schemas.is_empty() {
        "Available Tools: []".to_string()
    } else {
        format!(
            "Available Tools (as JSON Schemas):\n{}",
            serde_json::to_string_pretty(tool_schemas).unwrap_or_else(|_| "[]".into())
        )
    };

    let guides: Vec<&str> = tool_instructions
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    let tool_guides = if guides.is_empty() {
        "Tool-Specific Guidance:\nNone".to_string()
    } else {
        format!("Tool-Specific Guidance:\n{}", guides.join("\n"))
    };

    [
        persona,
        server,
        contract.to_string(),
        tooling_policy.to_string(),
        tools_block,
        tool_guides,
    ]
    .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identical_inputs_produce_identical_prompts() {
        let info = json!({ "id": 7, "name": "guild" });
        let schemas = vec![json!({ "type": "function" })];
        let instructions = vec!["use the tool wisely".to_string()];

        let a = build_system_prompt("Palaver", &info, &schemas, &instructions);
        let b = build_system_prompt("Palaver", &info, &schemas, &instructions);
        assert_eq!(a, b);
    }

    #[test]
    fn blocks_appear_in_fixed_order() {
        let info = json!({ "type": "DM", "guild": null });
        let prompt = build_system_prompt("Palaver", &info, &[], &[]);

        let persona_at = prompt.find("You are Palaver").expect("persona block");
        let server_at = prompt.find("Server Information").expect("server block");
        let contract_at = prompt.find("Response Contract").expect("contract block");
        let policy_at = prompt.find("Tool Usage Policy").expect("policy block");
        let tools_at = prompt.find("Available Tools").expect("tools block");
        let guides_at = prompt.find("Tool-Specific Guidance").expect("guidance block");

        assert!(persona_at < server_at);
        assert!(server_at < contract_at);
        assert!(contract_at < policy_at);
        assert!(policy_at < tools_at);
        assert!(tools_at < guides_at);
    }

    #[test]
    fn empty_inputs_get_placeholders() {
        let info = json!({});
        let prompt = build_system_prompt("  ", &info, &[], &[String::new()]);

        assert!(prompt.contains("You are Assistant"));
        assert!(prompt.contains("Available Tools: []"));
        assert!(prompt.ends_with("Tool-Specific Guidance:\nNone"));
    }
}
