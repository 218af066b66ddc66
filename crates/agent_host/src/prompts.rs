//! Instructions for the tool-choice model.

/// One line of guidance per tool the selector may pick.
const TOOL_GUIDE: &[(&str, &str)] = &[
    ("searchWeb", "For general questions that need current or factual information"),
    ("searchNews", "For news-related queries and recent events"),
    ("getStockInfo", "For stock/company queries that mention a ticker or listed company"),
    ("searchPlaces", "For location-based searches such as restaurants, shops or venues"),
    ("goShopping", "For product searches and price comparisons"),
    ("generateImage", "When the user asks you to create, draw or visualize an image"),
    ("getYoutubeTranscript", "When the user shares a YouTube link and asks about the video"),
];

/// System instruction for the tool selector. Only tools present in
/// `available` are listed.
pub fn get_tool_selector_prompt(available: &[String]) -> String {
    let guide = TOOL_GUIDE
        .iter()
        .filter(|(name, _)| available.iter().any(|a| a == name))
        .map(|(name, hint)| format!("- {}: use {}", hint, name))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are a function calling agent. You will be given a conversation and a list of functions.
Your task is to call the appropriate function based on the latest user message.
ONLY CALL A FUNCTION IF YOU ARE HIGHLY CONFIDENT IT WILL BE USED.

Choose the most relevant function based on the user's query:
{guide}

When the question needs fresh information but no specific function clearly fits, prefer searchWeb over a more specific function.
If the user is just chatting, asking for an opinion, or asking something you can answer without looking anything up, do not call any function.
Call at most one function."#
    )
}
