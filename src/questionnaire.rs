//! Risk questionnaire catalog
//!
//! Five fixed questions whose answers seed every mission.

use crate::models::{Language, MarketPreference, MissionInputs};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize)]
pub struct QuestionOption {
    pub label: &'static str,
    pub value: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct Question {
    pub id: &'static str,
    pub text: &'static str,
    pub options: Vec<QuestionOption>,
}

fn question(id: &'static str, text: &'static str, options: &[(&'static str, &'static str)]) -> Question {
    Question {
        id,
        text,
        options: options
            .iter()
            .map(|&(label, value)| QuestionOption { label, value })
            .collect(),
    }
}

lazy_static::lazy_static! {
    static ref QUESTIONS_EN: Vec<Question> = vec![
        question("q1", "What is your primary goal for this investment portfolio?", &[
            ("Capital Preservation (I cannot afford to lose money)", "conservative"),
            ("Steady Income with some growth", "moderate"),
            ("Long-term Growth", "growth"),
            ("Maximum Capital Appreciation (Speculation)", "aggressive"),
        ]),
        question("q2", "What is your investment time horizon?", &[
            ("Less than 3 years", "short"),
            ("3-7 years", "medium"),
            ("7-15 years", "long"),
            ("15+ years", "very_long"),
        ]),
        question("q3", "If your portfolio dropped 20% in a single month, what would you do?", &[
            ("Sell everything immediately to prevent further loss", "panic"),
            ("Sell some assets to reduce exposure", "nervous"),
            ("Do nothing, wait for recovery", "hold"),
            ("Buy more (View it as a discount)", "buy"),
        ]),
        question("q4", "How would you describe your current financial stability?", &[
            ("Unstable income, no emergency fund", "unstable"),
            ("Stable income, small savings", "stable"),
            ("High income, significant savings", "wealthy"),
        ]),
        question("q5", "What is your experience with investing?", &[
            ("None / Beginner", "novice"),
            ("Some experience (Mutual Funds/ETFs)", "intermediate"),
            ("Active Trader / Expert", "expert"),
        ]),
    ];

    static ref QUESTIONS_ZH_TW: Vec<Question> = vec![
        question("q1", "您此投資組合的主要目標是什麼？", &[
            ("資本保值 (我不能承受任何虧損)", "conservative"),
            ("穩定收益並伴隨部分成長", "moderate"),
            ("長期資本成長", "growth"),
            ("最大化資本增值 (投機)", "aggressive"),
        ]),
        question("q2", "您的投資時間範圍是多久？", &[
            ("少於 3 年", "short"),
            ("3-7 年", "medium"),
            ("7-15 年", "long"),
            ("15 年以上", "very_long"),
        ]),
        question("q3", "如果您的投資組合在一個月內下跌 20%，您會怎麼做？", &[
            ("立即全部賣出以防止進一步虧損", "panic"),
            ("賣出部分資產以減少曝險", "nervous"),
            ("什麼都不做，等待回升", "hold"),
            ("加碼買進 (視為特價)", "buy"),
        ]),
        question("q4", "您如何描述目前的財務穩定性？", &[
            ("收入不穩定，無緊急預備金", "unstable"),
            ("收入穩定，有少量儲蓄", "stable"),
            ("高收入，有大量儲蓄", "wealthy"),
        ]),
        question("q5", "您的投資經驗如何？", &[
            ("無經驗 / 初學者", "novice"),
            ("有一些經驗 (共同基金/ETF)", "intermediate"),
            ("活躍交易者 / 專家", "expert"),
        ]),
    ];
}

/// Question catalog in the requested language
pub fn risk_questions(language: Language) -> &'static [Question] {
    match language {
        Language::En => &QUESTIONS_EN,
        Language::ZhTw => &QUESTIONS_ZH_TW,
    }
}

/// Inputs from a fixed answer value for every question. Used by the CLI runner.
pub fn uniform_answers(value_index: usize, market: MarketPreference) -> MissionInputs {
    let answers: BTreeMap<String, String> = QUESTIONS_EN
        .iter()
        .filter_map(|q| {
            let option = q.options.get(value_index).or_else(|| q.options.last())?;
            Some((q.id.to_string(), option.value.to_string()))
        })
        .collect();

    MissionInputs::new(answers, market)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalogs_align_across_languages() {
        let en = risk_questions(Language::En);
        let zh = risk_questions(Language::ZhTw);
        assert_eq!(en.len(), 5);
        assert_eq!(en.len(), zh.len());

        for (a, b) in en.iter().zip(zh) {
            assert_eq!(a.id, b.id);
            let values_a: Vec<_> = a.options.iter().map(|o| o.value).collect();
            let values_b: Vec<_> = b.options.iter().map(|o| o.value).collect();
            assert_eq!(values_a, values_b);
        }
    }

    #[test]
    fn test_uniform_answers_clamps_to_last_option() {
        let inputs = uniform_answers(3, MarketPreference::Tw);
        assert_eq!(inputs.answers.len(), 5);
        assert_eq!(inputs.answers["q1"], "aggressive");
        // q4 only has three options
        assert_eq!(inputs.answers["q4"], "wealthy");
        assert!(inputs.validate().is_ok());
    }
}
