//! Prompt templates for the agreement-scale property rating.

use crate::RatingRequest;

/// Exact answer the model must give when the property is not demonstrated.
pub const NOT_APPLICABLE: &str = "[NaN,NaN]";

pub const SYSTEM_PROMPT: &str = "Forget any previous information.";

pub fn build_user_prompt(req: &RatingRequest) -> String {
    format!(
        "The following is a comment on a {product_line} product:\n\
         Title: {title}\n\
         Body: {body}\n\
         Evaluate the comment regarding the product's '{property}', which is categorized as a {property_type} feature.\n\
         Use the following rules to respond:\n\
         1. If the comment does not demonstrate the stated characteristic in any way, reply exactly {na} without any additional reasoning or explanation.\n\
         2. Otherwise, rate your agreement with the statement on a scale from 1 to 5:\n\
         - '5' for Strongly Agree\n\
         - '4' for Agree\n\
         - '3' for Neither Agree nor Disagree\n\
         - '2' for Disagree\n\
         - '1' for Strongly Disagree\n\
         Provide your rationale in the format: [Score, Reason].\n\
         ** Please double-check that if the comment does not demonstrate the stated characteristic in any way, your reply is exactly {na} with no extra explanation.",
        product_line = req.product_line,
        title = req.title,
        body = req.body,
        property = req.property_name,
        property_type = req.property_type,
        na = NOT_APPLICABLE,
    )
}
