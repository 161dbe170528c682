//! Prompt templates for the describer and transform stages.
//!
//! Templates are minijinja strings. Every template can reference `prompt`
//! (the user's input). Transform templates additionally receive `question`,
//! which is the output of the previous stage, and `description` where the
//! chain has one.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptTemplates {
  pub describer: DescriberPrompts,
  pub transform: TransformPrompts,
}

/// Instructions sent to the vision-language model, selected by the question hint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriberPrompts {
  /// No hint: the prompt as the user typed it.
  pub plain: String,
  /// The prompt was classified as a question.
  pub question: String,
  /// The prompt was classified as a statement.
  pub statement: String,
}

impl Default for DescriberPrompts {
  fn default() -> Self {
    Self {
      plain: "{{ prompt }}".to_string(),
      question: "Answer the question about this image. Name the objects in the image \
                 that your answer refers to.\nQuestion: {{ prompt }}"
        .to_string(),
      statement: "Describe this image in as much detail as possible, focusing on \
                  everything related to: {{ prompt }}. Identify the objects, their \
                  relative positions and visual characteristics."
        .to_string(),
    }
  }
}

/// Instructions sent to the text model on the statement branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformPrompts {
  /// Direct chain: the single extraction step.
  pub extract_related: String,
  /// Elaborate chain, step 1.
  pub extract_objects: String,
  /// Elaborate chain, step 2.
  pub elaborate: String,
  /// Elaborate chain, step 3.
  pub filter_relevant: String,
  /// Elaborate chain, step 4.
  pub extract_list: String,
}

impl Default for TransformPrompts {
  fn default() -> Self {
    Self {
      extract_related: "what are the main objects explicitly described in this: {{ question }} \
                        and related to {{ prompt }}"
        .to_string(),
      extract_objects: r#"You will get a description from an image, and you need to extract the objects mentioned in the image.
For example:
Description: A dog is lying on the grass.
Answer: 1. dog, 2. grass.
Now it's your turn: Extract all objects mentioned in the description below: {{ question }}"#
        .to_string(),
      elaborate: r#"Given the image description: "{{ description }}",
provide concise and accurate descriptions of the following objects: {{ question }}.
Focus on their visual characteristics and avoid redundant details."#
        .to_string(),
      filter_relevant: r#"Based on the object list below and the given question or description, identify the objects that are directly related.
If no objects are related, return "none."

Example:
Object list:
  1. Oranges: Round, segmented citrus fruits with thick, rough skin and juicy pulp.
  2. Lemons: Small, spherical citrus fruits with thin, smooth skin and acidic juice-filled cavities.
  3. Strawberries: Fleshy, aggregate fruits with bright red color, white seeds, and a hollow core.
Question or description: "strawberries"
Answer: Strawberries.

Now process the provided inputs.
Object list: {{ question }}
Question or description: "{{ prompt }}""#
        .to_string(),
      extract_list: r#"Extract all the objects mentioned in the input into a simple, comma-separated list.
Example:
Input:
  1. Fur: Light golden in color.
  2. Young golden retriever puppy: A small, light-golden canine with a joyful expression.
Answer: Fur, Young golden retriever puppy.

Now process the following input: Extract all the objects mentioned below into a list: {{ question }}"#
        .to_string(),
    }
  }
}
