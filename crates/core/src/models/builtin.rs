use rust_decimal::Decimal;

use crate::models::catalog::ModelCapability::{
    Chat, FunctionCalling, StructuredOutput, Thinking, Vision, WebSearch,
};
use crate::models::catalog::{ModelDescriptor, ModelPricing, ModelProvider};

fn price(input_cents: i64, output_cents: i64) -> ModelPricing {
    ModelPricing::per_million(Decimal::new(input_cents, 2), Decimal::new(output_cents, 2))
}

pub fn builtin_models() -> Vec<ModelDescriptor> {
    vec![
        ModelDescriptor::new("claude-sonnet-4-5", "Claude Sonnet 4.5", ModelProvider::Anthropic, 200_000)
            .with_aliases(&["sonnet", "claude-sonnet", "anthropic/claude-sonnet-4-5"])
            .with_capabilities(&[Chat, FunctionCalling, Vision, Thinking, StructuredOutput])
            .with_max_output(64_000)
            .with_pricing(price(300, 1_500))
            .with_priority(100)
            .recommended(),
        ModelDescriptor::new("claude-haiku-4-5", "Claude Haiku 4.5", ModelProvider::Anthropic, 200_000)
            .with_aliases(&["haiku", "anthropic/claude-haiku-4-5"])
            .with_capabilities(&[Chat, FunctionCalling, Vision, StructuredOutput])
            .with_max_output(64_000)
            .with_pricing(price(100, 500))
            .with_priority(90),
        ModelDescriptor::new("gpt-5", "GPT-5", ModelProvider::OpenAi, 400_000)
            .with_aliases(&["openai/gpt-5"])
            .with_capabilities(&[Chat, FunctionCalling, Vision, Thinking, StructuredOutput])
            .with_max_output(128_000)
            .with_pricing(price(125, 1_000))
            .with_priority(99),
        ModelDescriptor::new("gpt-5-mini", "GPT-5 Mini", ModelProvider::OpenAi, 400_000)
            .with_aliases(&["openai/gpt-5-mini", "gpt5-mini"])
            .with_capabilities(&[Chat, FunctionCalling, Vision, StructuredOutput])
            .with_max_output(128_000)
            .with_pricing(price(25, 200))
            .with_priority(98),
        ModelDescriptor::new("gemini-2.5-pro", "Gemini 2.5 Pro", ModelProvider::Google, 1_048_576)
            .with_aliases(&["gemini/gemini-2.5-pro", "gemini-pro"])
            .with_capabilities(&[Chat, FunctionCalling, Vision, Thinking, StructuredOutput])
            .with_max_output(65_536)
            .with_pricing(price(125, 1_000))
            .with_priority(96),
        ModelDescriptor::new("grok-4-fast", "Grok 4 Fast", ModelProvider::Xai, 2_000_000)
            .with_aliases(&["xai/grok-4-fast-non-reasoning", "grok-fast"])
            .with_capabilities(&[Chat, FunctionCalling, Vision, WebSearch])
            .with_max_output(30_000)
            .with_pricing(price(20, 50))
            .with_priority(95),
        ModelDescriptor::new("kimi-k2", "Kimi K2", ModelProvider::MoonshotAi, 262_144)
            .with_aliases(&["moonshotai/kimi-k2", "openrouter/moonshotai/kimi-k2"])
            .with_capabilities(&[Chat, FunctionCalling])
            .with_pricing(price(60, 250))
            .with_priority(94),
        ModelDescriptor::new("llama-4-scout", "Llama 4 Scout", ModelProvider::Groq, 131_072)
            .with_aliases(&["groq/llama-4-scout"])
            .with_capabilities(&[Chat, FunctionCalling])
            .with_max_output(8_192)
            .with_priority(80)
            .beta(),
    ]
}
