//! LLM prompts for answering, grading and OCR correction.

/// Collection of prompts used by the harness.
pub struct Prompts;

impl Prompts {
    /// System prompt opening every answering conversation.
    pub fn answer_system() -> &'static str {
        "Based on the information provided give short and concise answers to the following questions"
    }

    /// Grading rubric for the judge model.
    pub fn grading_rubric() -> &'static str {
        r#"You validate whether the provided answer correctly contains the specific correct answer, and ensure that it does not contain any prohibited information as specified. You will either confirm the answer as correct (1) or incorrect (0).

Instructions:
1. You will be given two pieces of text: "answer" and "correct_answer". Optionally, a "not_mention" field may be provided.
2. Review the "answer" text to determine if it contains the "correct_answer" and does not include any content listed in "not_mention".
3. Respond only with '1' if the "answer" text contains the "correct_answer" and adheres to the "not_mention" condition (if applicable). Respond with '0' if it does not meet these criteria.

Criteria for Response:
- Your output must strictly be a single character: '1' or '0'.
- Treat the following variations as equivalent to the "correct_answer":
  - Date formats (e.g., '1 Jan 2023' vs. 'January 1, 2023')
  - Number formats (e.g., 'ten' vs. '10')
  - Abbreviations and full forms (e.g., 'St.' vs. 'Street')
  - Synonyms and closely related terms (e.g., 'car' vs. 'automobile')
  - Order of the parts of a multi-part answer (e.g., '18 April' vs. 'April 18', 'red and blue' vs. 'blue and red')
- If "not_mention" is provided, respond '0' when any of the terms or information it lists appears in the "answer".

Examples:
- answer: "Mickey Mouse's number is 69. Located in Orlando."
  correct_answer: "69"
  not_mention: "Orlando"
  response: 0
- answer: "The total was ten dollars."
  correct_answer: "10"
  response: 1
- answer: "He lives on Elm Street."
  correct_answer: "Elm St."
  not_mention: "Main St."
  response: 1
- answer: "The meeting is on 18 April."
  correct_answer: "April 18"
  response: 1

Handling Ambiguities:
- If the correctness of the "answer" with respect to the "correct_answer" is ambiguous, or if the "not_mention" condition is unclear due to interpretation or incomplete information in the text, respond '0'.

Your response must remain consistent and reliable. Output only '1' or '0'."#
    }

    /// User turn for one grading request.
    pub fn grading_request(answer: &str, correct_answer: &str, not_mention: Option<&str>) -> String {
        match not_mention.filter(|nm| !nm.trim().is_empty()) {
            Some(nm) => format!(
                "answer: {}, correct_answer: {}, not_mention: {}",
                answer, correct_answer, nm
            ),
            None => format!("answer: {}, correct_answer: {}", answer, correct_answer),
        }
    }

    /// System prompt for cleaning up raw OCR output of one page.
    pub fn ocr_correction() -> &'static str {
        r#"You are correcting the raw OCR output of one page of a PDF document.

Fix character recognition errors, rejoin words split across lines and restore paragraph breaks. Format headings and lists as Markdown. Do not add, summarize or remove content. Return only the corrected page text."#
    }
}
