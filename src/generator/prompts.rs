//! 各阶段的提示模板
//!
//! 每个函数返回一次调用的 [`PromptFields`]，`task` 标签见 [`tasks`]。

use crate::llm::PromptFields;

/// 调用的用途标签
pub mod tasks {
    pub const FIND_RELATED_OPPORTUNITY: &str = "find_related_opportunity";
    pub const GEN_PERSONA: &str = "gen_persona";
    pub const ASK_QUESTION: &str = "ask_question";
    pub const QUESTION_TO_QUERY: &str = "question_to_query";
    pub const ANSWER_QUESTION: &str = "answer_question";
    pub const WRITE_PAGE_OUTLINE: &str = "write_page_outline";
    pub const WRITE_PAGE_OUTLINE_FROM_CONV: &str = "write_page_outline_from_conv";
    pub const WRITE_SECTION: &str = "write_section";
    pub const WRITE_LEAD_SECTION: &str = "write_lead_section";
    pub const POLISH_PAGE: &str = "polish_page";
}

/// 写作者结束对话时说的话
pub const CONVERSATION_STOP_PHRASE: &str = "Thank you so much for your help!";

/// 没有检索结果时专家的固定回答
pub const NO_INFORMATION_ANSWER: &str =
    "Sorry, I cannot find information for this question. Please ask another question.";

const HEADING_FORMAT: &str = "Here is the format of your writing:\n\
1. Use \"#\" Title\" to indicate section title, \"##\" Title\" to indicate subsection title, \"###\" Title\" to indicate subsubsection title, and so on.\n\
2. Do not include other information.";

pub fn find_related_opportunity(opportunity: &str) -> PromptFields {
    PromptFields::new(
        tasks::FIND_RELATED_OPPORTUNITY,
        "I'm writing an investment report for the investment opportunity mentioned below. \
         Please identify and recommend some Wikipedia pages on closely related subjects. \
         I'm looking for examples that provide insights into interesting aspects commonly associated with this investment opportunity, \
         or examples that help me understand the typical content and structure included in investment reports for similar opportunities.\n\
         Please list the urls in separate lines.",
    )
    .input("Investment opportunity", opportunity)
    .output("Related pages")
}

pub fn gen_persona(opportunity: &str, examples: &str) -> PromptFields {
    PromptFields::new(
        tasks::GEN_PERSONA,
        "You need to select a group of experts or investment professionals (the persona) who will work together \
         to create a comprehensive report on the potential investment opportunity, typically a company. \
         Each of them represents a different perspective, role, or affiliation related to this investment opportunity. \
         You can use other Wikipedia pages of related investment opportunities for inspiration. \
         For each editor, add a description of what they will focus on.\n\
         Give your answer in the following format: 1. short summary of persona 1: description\n2. short summary of persona 2: description\n...",
    )
    .input("Investment opportunity", opportunity)
    .input("Wiki page outlines of related opportunities for inspiration", examples)
    .output("Personas")
}

/// 写作者带着角色视角提问
pub fn ask_question(opportunity: &str, persona: &str, history: &str) -> PromptFields {
    PromptFields::new(
        tasks::ASK_QUESTION,
        &format!(
            "You are an experienced investment report writer and want to research a specific investment opportunity. \
             Besides your identity as a writer, you have a specific focus when researching the opportunity. \
             Now, you are chatting with an expert to get information. Ask good questions to get more useful information.\n\
             When you have no more question to ask, say \"{}\" to end the conversation.\n\
             Please only ask one question at a time and don't ask what you have asked before. \
             Your questions should be related to the investment opportunity you want to write.",
            CONVERSATION_STOP_PHRASE
        ),
    )
    .input("Investment opportunity you want to write", opportunity)
    .input("Your persona besides being an investment report writer", persona)
    .input("Conversation history", history)
    .output("Question")
}

pub fn question_to_query(opportunity: &str, question: &str) -> PromptFields {
    PromptFields::new(
        tasks::QUESTION_TO_QUERY,
        "You want to answer the question using web search. What do you type in the search box?\n\
         Write the queries you will use in the following format:\n- query 1\n- query 2\n...",
    )
    .input("Investment opportunity you are discussing about", opportunity)
    .input("Question you want to answer", question)
    .output("Queries")
}

pub fn answer_question(opportunity: &str, question: &str, info: &str) -> PromptFields {
    PromptFields::new(
        tasks::ANSWER_QUESTION,
        "You are an expert who can use information effectively. \
         You are chatting with an investment report writer who wants to write a report on an investment opportunity you know. \
         You have gathered the related information and will now use the information to form a response.\n\
         Make your response as informative as possible and make sure every sentence is supported by the gathered information. \
         Cite the gathered information with [1], [2], ... inline. \
         If the gathered information is not related to the investment opportunity and the question, \
         output \"Sorry, I don't have enough information to answer the question.\".",
    )
    .input("Investment opportunity you are discussing about", opportunity)
    .input("Question", question)
    .input("Gathered information", info)
    .output("Now give your response. (Try to use as many different sources as possible and do not hallucinate.)")
}

/// 不依赖调研结果的草稿大纲
pub fn write_page_outline(opportunity: &str) -> PromptFields {
    PromptFields::new(
        tasks::WRITE_PAGE_OUTLINE,
        &format!("Write an outline for an investment report.\n{}", HEADING_FORMAT),
    )
    .input("The investment opportunity you want to write", opportunity)
    .output("Write the investment report outline")
}

pub fn write_page_outline_from_conv(
    opportunity: &str,
    conversation: &str,
    draft_outline: &str,
) -> PromptFields {
    PromptFields::new(
        tasks::WRITE_PAGE_OUTLINE_FROM_CONV,
        &format!(
            "Improve an outline for an investment report. You already have a draft outline that covers the general information. \
             Now you want to improve it based on the information learned from an information-seeking conversation to make it more informative.\n{}",
            HEADING_FORMAT
        ),
    )
    .input("The investment opportunity you want to write", opportunity)
    .input("Conversation history", conversation)
    .input("Current outline", draft_outline)
    .output("Write the investment report outline")
}

pub fn write_section(info: &str, opportunity: &str, section: &str) -> PromptFields {
    PromptFields::new(
        tasks::WRITE_SECTION,
        "Write the section of an investment report based on the collected information.\n\n\
         Here is the format of your writing:\n\
         1. Use \"#\" Title\" to indicate section title, \"##\" Title\" to indicate subsection title, \"###\" Title\" to indicate subsubsection title, and so on.\n\
         2. Use [1], [2], ..., [n] in line (for example, \"The capital of the United States is Washington, D.C.[1][3].\"). \
         You DO NOT need to include a References or Sources section to list the sources at the end.",
    )
    .input("The collected information", info)
    .input("The investment opportunity of the report", opportunity)
    .input("The section you need to write", section)
    .output("Write the section with proper inline citations (Start your writing with # section title. Don't include the page title or try to write other sections)")
}

pub fn write_lead_section(opportunity: &str, draft_page: &str) -> PromptFields {
    PromptFields::new(
        tasks::WRITE_LEAD_SECTION,
        "Write a lead section for the given investment report with the following guidelines:\n\
         1. The lead should stand on its own as a concise overview of the report's investment opportunity. \
         It should identify the investment opportunity, establish context, explain why the opportunity is notable, \
         and summarize the most important points, including any prominent controversies.\n\
         2. The lead section should be concise and contain no more than four well-composed paragraphs.\n\
         3. The lead section should be carefully sourced as appropriate. \
         Add inline citations (e.g., \"Washington, D.C., is the capital of the United States.[1][3].\") where necessary.",
    )
    .input("The investment opportunity of the report", opportunity)
    .input("The draft report", draft_page)
    .output("Write the lead section")
}

pub fn polish_page(draft_page: &str) -> PromptFields {
    PromptFields::new(
        tasks::POLISH_PAGE,
        "You are a faithful text editor that is good at finding repeated information in the report and deleting them \
         to make sure there is no repetition in the report. You won't delete any non-repeated part in the report. \
         You will keep the inline citations and report structure (indicated by \"#\", \"##\", etc.) appropriately. \
         Do your job for the following report.",
    )
    .input("The draft report", draft_page)
    .output("Your revised report")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_section_field_order() {
        let prompt = write_section("[1]\nRevenue grew.", "Acme", "# Financials");
        let (system, user) = prompt.render();
        assert!(system.starts_with("Write the section of an investment report"));

        let info = user.find("The collected information:").unwrap();
        let opportunity = user.find("The investment opportunity of the report:").unwrap();
        let section = user.find("The section you need to write:").unwrap();
        assert!(info < opportunity && opportunity < section);
        assert!(user.ends_with("Don't include the page title or try to write other sections):"));
    }

    #[test]
    fn test_outline_prompts_share_heading_format() {
        let draft = write_page_outline("Acme");
        assert!(
            draft
                .instruction
                .ends_with("Do not include other information.")
        );
        assert!(draft.instruction.contains(
            "1. Use \"#\" Title\" to indicate section title, \"##\" Title\" to indicate subsection title"
        ));

        let refined = write_page_outline_from_conv("Acme", "Writer: q", "# Overview");
        assert!(refined.instruction.contains("\n1. Use \"#\" Title\""));
        assert_eq!(refined.get("Current outline"), Some("# Overview"));
    }

    #[test]
    fn test_ask_question_mentions_stop_phrase() {
        let prompt = ask_question("Acme", "Analyst: numbers", "N/A");
        assert_eq!(prompt.task, tasks::ASK_QUESTION);
        assert!(prompt.instruction.contains(CONVERSATION_STOP_PHRASE));
        assert_eq!(
            prompt.get("Your persona besides being an investment report writer"),
            Some("Analyst: numbers")
        );
    }
}
