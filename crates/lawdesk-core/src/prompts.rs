//! Prompt templates for the three LLM stages and parsers for their output.
//!
//! The templates are fixed contracts: the keyword parser and the
//! insufficiency check below rely on the format they ask for.

/// Emitted by the filter stage when nothing relevant survives.
pub const INSUFFICIENT_MARKER: &str = "검색된 관련 법령 정보가 부족함";

/// Sentence the report must use instead of citing when the context is empty.
pub const NO_BASIS_STATEMENT: &str = "현재 데이터로는 정확한 근거를 찾기 어렵다";

pub const KEYWORD_DELIMITER: char = ',';

pub fn keyword_prompt(user_text: &str) -> String {
    format!(
        "당신은 법률 전문 검색 쿼리 작성자입니다.\n\
         사용자 상황: {user_text}\n\
         \n\
         위 상황의 인허가 요건과 위법 여부를 확인하기 위해 국가법령정보센터에서 검색할 단어를 정확히 2개만 뽑아주세요.\n\
         조건:\n\
         1. '법인세', '증여세', '행정소송 절차'처럼 무관한 세무·행정절차 판례가 나오지 않도록 비즈니스 핵심 법령 위주로 구성하세요.\n\
         2. 각 검색어는 '법령명 + 핵심단어' 조합으로 만드세요. (예: 전자금융거래법 선불전자지급수단)\n\
         3. 결과는 다른 설명 없이 콤마(,)로만 구분해서 출력하세요."
    )
}

pub fn filter_prompt(user_text: &str, context: &str) -> String {
    format!(
        "사용자 상황: {user_text}\n\
         수집된 데이터: {context}\n\
         \n\
         위 데이터 중 사용자 상황과 '직접적인' 관련이 없는 내용은 삭제하고,\n\
         실제 비즈니스 가이드에 필요한 핵심 법령/판례 내용만 남겨서 정리해줘.\n\
         만약 모두 관련이 없다면 '{INSUFFICIENT_MARKER}'이라고만 적어줘."
    )
}

pub fn synthesis_prompt(user_text: &str, filtered_context: &str) -> String {
    let mut s = format!(
        "당신은 숙련된 법률 컨설턴트입니다. 아래 필터링된 데이터를 바탕으로 분석 보고서를 작성하세요.\n\
         \n\
         사용자 상황: {user_text}\n\
         참고 법률 데이터: {filtered_context}\n\
         \n\
         [지침]\n\
         1. 인사나 서론 없이 \"이 사업(상황)의 핵심은 ~입니다\"라는 한 줄 요약으로 시작하세요.\n\
         2. 신규 사업 아이디어라면 등록·인허가 요건(자본금/인력 등), 관련 법령, 리스크를 이 순서대로 설명하세요.\n\
         3. 일반 법률 질문이라면 관련 법률 조항과 판례 요지를 명확히 소개하세요.\n\
         4. 확보된 데이터에 일치하는 법률이나 판례가 없으면 지어내지 말고 \"{NO_BASIS_STATEMENT}\"고 답하세요.\n\
         5. 분석 후에는 \"더 구체적으로 어떤 부분을 알아봐 드릴까요?\" 같은 질문으로 대화를 이어가세요.\n\
         6. 마지막에 본 답변은 법적 구속력이 없는 참고용 정보라는 면책 문구를 포함하세요."
    );
    if is_insufficient(filtered_context) {
        s.push_str(&format!(
            "\n\n[주의] 참고 법률 데이터가 비어 있거나 부족합니다. 법령명·조문 번호·판례 번호를 \
             인용하지 말고, 요약 다음에 \"{NO_BASIS_STATEMENT}\"는 점을 명시하세요."
        ));
    }
    s
}

/// Split the keyword-stage completion on commas.
///
/// Fragments are trimmed and empty ones dropped; the count is not enforced.
pub fn parse_keywords(completion: &str) -> Vec<String> {
    completion
        .split(KEYWORD_DELIMITER)
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

/// True when the filter stage left nothing usable.
pub fn is_insufficient(filtered_context: &str) -> bool {
    let trimmed = filtered_context.trim();
    trimmed.is_empty() || trimmed.contains(INSUFFICIENT_MARKER)
}
