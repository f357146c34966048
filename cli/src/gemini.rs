use anyhow::{Context, Result, bail};
use serde::Deserialize;

use larder_core::gemini::{GeneratedRecipe, generated_to_recipe};
use larder_core::models::{GenerateRecipeRequest, NewRecipe};
use larder_core::service::RecipeGenerator;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const MODEL: &str = "gemini-1.5-flash";

pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    rt: tokio::runtime::Handle,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ContentPart>,
}

#[derive(Deserialize)]
struct ContentPart {
    text: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(format!("larder-cli/{} (meal planner)", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(30))
            .connect_timeout(std::time::Duration::from_secs(5))
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            api_key,
            rt: tokio::runtime::Handle::current(),
        }
    }

    pub fn from_env() -> Result<Self> {
        let key = crate::config::Config::gemini_api_key()
            .context("GEMINI_API_KEY is not set. AI recipe generation needs a Gemini API key")?;
        Ok(Self::new(key))
    }

    async fn call(&self, prompt: &str) -> Result<String> {
        let url = format!("{API_BASE}/{MODEL}:generateContent?key={}", self.api_key);
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "response_mime_type": "application/json" }
        });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("Failed to reach Gemini API")?;

        if !resp.status().is_success() {
            bail!("Gemini API returned {}", resp.status());
        }

        let data: GeminiResponse = resp
            .json()
            .await
            .context("Failed to parse Gemini API response")?;

        let text = data
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .context("Gemini response contained no candidates")?;

        Ok(strip_code_fence(&text).to_string())
    }

    pub async fn generate_async(&self, request: &GenerateRecipeRequest) -> Result<NewRecipe> {
        let prompt = build_recipe_prompt(request);
        let text = self.call(&prompt).await?;
        let generated: GeneratedRecipe =
            serde_json::from_str(&text).context("Gemini returned malformed recipe JSON")?;
        generated_to_recipe(generated).context("Gemini response lacked a usable recipe")
    }

    pub async fn suggest_ingredients_async(&self, ingredients: &[String]) -> Result<Vec<String>> {
        let prompt = build_suggest_prompt(ingredients);
        let text = self.call(&prompt).await?;
        let suggestions: Vec<String> =
            serde_json::from_str(&text).context("Gemini returned malformed suggestion JSON")?;
        Ok(suggestions
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect())
    }
}

impl RecipeGenerator for GeminiClient {
    fn generate(&self, request: &GenerateRecipeRequest) -> Result<NewRecipe> {
        self.rt.block_on(self.generate_async(request))
    }
}

fn build_recipe_prompt(request: &GenerateRecipeRequest) -> String {
    let mut prompt = String::from(
        "Create a recipe as a single JSON object with keys: name, description, \
         ingredients (array of {name, quantity, unit}), instructions (array of \
         strings), cuisine_type, difficulty (easy|medium|hard), prep_time, \
         cook_time, servings, dietary_tags (array of strings), nutrition \
         ({calories, protein_g, carbs_g, fat_g} per serving). \
         Respond with JSON only, no markdown.",
    );
    if !request.ingredients.is_empty() {
        prompt.push_str(&format!(
            " Use these ingredients: {}.",
            request.ingredients.join(", ")
        ));
    }
    if !request.dietary_restrictions.is_empty() {
        prompt.push_str(&format!(
            " Dietary restrictions: {}.",
            request.dietary_restrictions.join(", ")
        ));
    }
    if let Some(cuisine) = &request.cuisine_type {
        prompt.push_str(&format!(" Cuisine: {cuisine}."));
    }
    if let Some(servings) = request.servings {
        prompt.push_str(&format!(" Servings: {servings}."));
    }
    if let Some(time) = &request.cooking_time {
        prompt.push_str(&format!(" Total cooking time: {time}."));
    }
    prompt
}

fn build_suggest_prompt(ingredients: &[String]) -> String {
    format!(
        "Given these ingredients: {}. Suggest up to 8 complementary ingredients \
         to cook a complete meal. Respond with a JSON array of ingredient name \
         strings only, no markdown.",
        ingredients.join(", ")
    )
}

/// Strip a surrounding markdown code fence if the model added one anyway.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}
