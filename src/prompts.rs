// prompts.rs

pub const CONTENT_KEY: &str = "주제관련";
pub const EVALUATION_KEY: &str = "평가관련";

pub const DECOMPOSITION_SYSTEM_PROMPT: &str = "너는 문장을 '수업의 강의 주제과 관련된 문장', '수업의 평가와 관련된 문장'으로 분류하는 문장 분류 전문가야.";

const EXAMPLE_QUERY: &str = "나는 인공지능과 관련된 수업을 듣고 싶은데, 빡세더라도 얻어가는게 많았으면 좋겠어. 수업 안에서 인공지능의 원론적인 내용보다는 딥러닝 관련 내용을 배우고싶고 교수님이 학점을 잘 주시고 강의력이 좋으면 좋겠어.";

const EXAMPLE_ANSWER: &str = r#"{"주제관련": ["인공지능과 관련된 수업", "수업 안에서 인공지능의 원론적인 내용보다는 딥러닝 관련 내용을 배우는 수업"], "평가관련": ["빡세더라도 얻어가는게 많은 수업", "교수님이 학점을 잘주시는 수업", "교수님이 강의력이 좋은 수업"]}"#;

/// Few-shot prompt asking the model to split `query` into topic and evaluation sentences.
pub fn decomposition_prompt(query: &str) -> String {
    format!(
        "예시:

질문:
{}

답변:
{}

위의 형식과 동일한 형식으로 다음 질문에 대한 답변해주세요.

질문:
{}

답변:
",
        EXAMPLE_QUERY,
        EXAMPLE_ANSWER,
        query.trim()
    )
}
