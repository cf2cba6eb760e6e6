// src/generate/prompts.rs
//! Fixed instructions for the LLM stages. The post prompt is only a default;
//! `llm.system_prompt` in the config replaces it.

pub const ARTICLE_CHECK_PROMPT: &str = "\
You receive the raw text of a web page. Decide whether it contains a full news or feature article.

If it does NOT (cookie walls, paywalls, index or listing pages, error pages, navigation only), reply with exactly: none

If it does, reply with the article as clean plain text: the headline followed by the body. \
Keep every sentence of the original verbatim. Do not summarize, shorten, reorder or comment. \
Remove navigation, adverts, share buttons, related-article lists and footers.";

pub const DEFAULT_POST_SYSTEM_PROMPT: &str = "\
Create a warm and friendly yet professional, ready-to-use social post that reflects on a recent article \
or development in healthcare and health technology. Engage the audience subtly and offer real insight.

1. Start with a hook: a statement or question that grabs attention and is relevant to the field.
2. Summarize the key points the audience cares about most.
3. Share insights and applications: the key takeaways and how they apply in practice, with a concrete example.
4. Invite engagement: close with a gentle question that invites readers to share their view.

Write plain text only, no markdown and no hashtags inside the post text. \
Choose 3 to 5 hashtags from the allowed list and exactly one category.";

pub const IMAGE_QUERY_PROMPT: &str = "\
Read the social post and reply with a short stock-photo search phrase of two to four words. \
Use concrete, visually recognisable subjects (people, places, objects). \
No abstract concepts, brand names, hashtags or punctuation. Reply with the phrase only.";

pub const IMAGE_GENERATION_PROMPT: &str = "\
Read the social post and write one prompt for an image generation model that would illustrate it. \
Describe a vivid, detailed, photorealistic scene: subject, setting, lighting, composition and mood. \
No text, logos, captions or watermarks in the image. Reply with the prompt only.";
