use crate::llm::ChatMessage;
use crate::scraper::PageRecord;

/// How much page text goes into the prompt, in characters.
pub const MAX_PROMPT_TEXT_CHARS: usize = 5000;

pub const SYSTEM_PROMPT: &str = "You are a highly intelligent assistant tasked with analyzing website content. \
Your job is to extract and summarize the **core purpose** and **main content** of the site, ignoring any navigation bars, footers, cookie banners, or repetitive UI elements. \
You excel at identifying meaningful information such as services offered, articles, announcements, product details, or business descriptions. \
Always format your response in **markdown**, and present the summary in a clean, human-readable format that would make sense to someone who has never seen the site before.";

pub fn build_user_prompt(record: &PageRecord) -> String {
    let text: String = record.text.chars().take(MAX_PROMPT_TEXT_CHARS).collect();

    let mut result = String::with_capacity(text.len() + record.title.len() + 800);
    result.push_str("## Website Title\n");
    result.push_str(&format!("**{}**\n\n", record.title));
    result.push_str("## Instructions\n");
    result.push_str(
        "You are analyzing the contents of this website. Please provide a clear and concise markdown summary of the website's purpose and content. \
Include any relevant details such as:\n\
- Services, products, or features offered\n\
- Blog posts, articles, or resources\n\
- News or announcements\n\
- Contact information, locations, or teams (if present)\n\n",
    );
    result.push_str("### Important:\n");
    result.push_str("- **Ignore** navigation links, UI controls, cookie notices, or footer text.\n");
    result.push_str("- Focus on meaningful, unique content visible to a visitor.\n\n");
    result.push_str("## Website Content\n");
    result.push_str(&text);
    result
}

pub fn build_messages(record: &PageRecord) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(build_user_prompt(record)),
    ]
}
