use serde::Serialize;
use tera::{Context, Error as TeraError, Tera};

/// Render a tera template string against serializable context data
pub fn render_prompt<T: Serialize>(template: &str, context_data: &T) -> Result<String, TeraError> {
    let mut tera = Tera::default();
    tera.add_raw_template("inline_template", template)?;
    let context = Context::from_serialize(context_data)?;
    let rendered = tera.render("inline_template", &context)?;
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_render_prompt() {
        let template = "Hello, {{ name }}! You are {{ age }} years old.";
        let mut context = HashMap::new();
        context.insert("name".to_string(), "Alice".to_string());
        context.insert("age".to_string(), 30.to_string());

        let result = render_prompt(template, &context).unwrap();
        assert_eq!(result, "Hello, Alice! You are 30 years old.");
    }

    #[test]
    fn test_render_prompt_missing_variable() {
        let template = "Hello, {{ name }}! You are {{ age }} years old.";
        let mut context = HashMap::new();
        context.insert("name".to_string(), "Alice".to_string());
        // 'age' is missing from context
        let result = render_prompt(template, &context);
        assert!(result.is_err());
    }

    #[test]
    fn test_render_prompt_with_list() {
        let template =
            "Instructions:\n{% for item in items %}- {{ item }}\n{% endfor %}";
        let mut context = HashMap::new();
        context.insert(
            "items".to_string(),
            vec!["first".to_string(), "second".to_string()],
        );

        let result = render_prompt(template, &context).unwrap();
        assert_eq!(result, "Instructions:\n- first\n- second\n");
    }
}
