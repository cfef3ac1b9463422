use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Separator placed between the instructions and user supplied context.
pub const CONTEXT_SEPARATOR: &str = "\n\nAdditional Context Provided by the User:\n";

const DIAGNOSIS_WITH_BODY_PART: &str = "\
API Prompt: Skin Condition Analysis for Vitiligo Detection with Specific Body Part Identification

Purpose: To analyze submitted images for the presence of vitiligo and identify the body part shown.

Input: An image, preferably a clear close-up of the skin area in question, showing a part of the body.

Processing Instructions:
1. Analyze the image for skin patterns and coloration, focusing on detecting vitiligo.
2. Identify the part of the body shown in the image as either truncal, lower extremities, or upper extremities.
3. Do not provide any descriptions, explanations, or medical advice.

Output:
- If vitiligo is detected, return the output in the format \"Vitiligo, [Body Part]\" (e.g., \"Vitiligo, Lower Extremities\").
- If no vitiligo is detected, return the output in the format \"No Conditions Found, [Body Part]\" (e.g., \"No Conditions Found, Truncal\").
- If the body part cannot be determined, return \"Vitiligo, No Results\" or \"No Conditions Found, No Results\" accordingly.

Note: This AI analysis is strictly limited to the detection of vitiligo and identification of the body part in the image. It does not include any other diagnosis or medical advice. For any health concerns, consultation with a healthcare professional is recommended.";

const DIAGNOSIS: &str = "\
API Prompt: Skin Condition Analysis for Vitiligo Detection

Purpose: To analyze submitted images for the presence of vitiligo.

Input: An image, preferably a close-up of the skin area in question.

Processing Instructions:
1. Analyze the image for skin patterns and coloration.
2. Specifically, look for irregular white patches that are characteristic of vitiligo.
3. Compare observed patterns with known vitiligo characteristics.
4. The analysis is binary: the AI should only determine if the image shows signs of vitiligo or not.

Output:
- Return \"Vitiligo\" if the skin condition matches vitiligo characteristics.
- Return \"No Conditions Found\" if no signs of vitiligo are detected.
- The AI should not provide any medical advice or diagnoses beyond this binary output.

Note: This analysis is limited to identifying the presence or absence of vitiligo. It does not include the diagnosis of any other skin conditions or medical advice. For medical concerns, a consultation with a healthcare professional is advised.";

// Sentences run together with no separator.
const SPECIALIST_REPORT: &str = concat!(
    "Quero que você atue como um especialista profissional e eficiente em identificação de vitiligo e seus tipos.",
    "O vitiligo é uma doença de pele que se caracteriza pela perda da coloração da pele, chamada de hipopigmentação.",
    "Preciso de ajuda para identificar o vitiligo e seus tipos.",
    "Fornecerei a você uma imagem de um paciente com vitiligo.",
    "Você precisará me fornecer informacoes especiais do vitiligo indentificado no paciente. como por exemplo onde ele esta localizado, e o tipo",
    "Caso nao consiga identificar informacoes especiais da imagem retorne um \"Nao sei\".\"",
);

/// Fixed instruction sets the analysis can run with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptTemplate {
    /// "Vitiligo, [Body Part]" or "No Conditions Found, [Body Part]".
    #[default]
    DiagnosisWithBodyPart,
    /// Binary "Vitiligo" / "No Conditions Found".
    Diagnosis,
    /// Free-form specialist report, in Portuguese.
    SpecialistReport,
}

impl PromptTemplate {
    pub const ALL: [PromptTemplate; 3] = [
        PromptTemplate::DiagnosisWithBodyPart,
        PromptTemplate::Diagnosis,
        PromptTemplate::SpecialistReport,
    ];

    pub fn text(&self) -> &'static str {
        match self {
            PromptTemplate::DiagnosisWithBodyPart => DIAGNOSIS_WITH_BODY_PART,
            PromptTemplate::Diagnosis => DIAGNOSIS,
            PromptTemplate::SpecialistReport => SPECIALIST_REPORT,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PromptTemplate::DiagnosisWithBodyPart => "diagnosis_with_body_part",
            PromptTemplate::Diagnosis => "diagnosis",
            PromptTemplate::SpecialistReport => "specialist_report",
        }
    }
}

impl fmt::Display for PromptTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromptTemplate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PromptTemplate::ALL
            .into_iter()
            .find(|template| template.as_str() == s)
            .ok_or_else(|| format!("unknown prompt template '{}'", s))
    }
}

/// User supplied context, only honoured when the toggle is on.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdditionalDetails {
    pub enabled: bool,
    pub text: String,
}

impl AdditionalDetails {
    pub fn new(enabled: bool, text: impl Into<String>) -> Self {
        Self {
            enabled,
            text: text.into(),
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    fn effective(&self) -> Option<&str> {
        (self.enabled && !self.text.is_empty()).then_some(self.text.as_str())
    }
}

/// The assembled instruction text for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt(String);

impl Prompt {
    pub fn build(template: PromptTemplate, details: &AdditionalDetails) -> Self {
        let mut text = template.text().to_string();
        if let Some(context) = details.effective() {
            text.push_str(CONTEXT_SEPARATOR);
            text.push_str(context);
        }
        Prompt(text)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}
