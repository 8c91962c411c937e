/// 一次模型调用的结构化提示
///
/// `task` 是调用的用途标签，只用于日志和调用记录，不进入提示正文。
#[derive(Debug, Clone, PartialEq)]
pub struct PromptFields {
    pub task: String,
    pub instruction: String,
    /// 有序的 (前缀, 取值)
    pub inputs: Vec<(String, String)>,
    pub output_prefix: String,
}

impl PromptFields {
    pub fn new(task: &str, instruction: &str) -> Self {
        Self {
            task: task.to_string(),
            instruction: instruction.trim().to_string(),
            inputs: Vec::new(),
            output_prefix: String::new(),
        }
    }

    pub fn input(mut self, prefix: &str, value: impl Into<String>) -> Self {
        self.inputs.push((prefix.to_string(), value.into()));
        self
    }

    pub fn output(mut self, prefix: &str) -> Self {
        self.output_prefix = prefix.to_string();
        self
    }

    /// 取某个输入字段的值
    pub fn get(&self, prefix: &str) -> Option<&str> {
        self.inputs
            .iter()
            .find(|(p, _)| p == prefix)
            .map(|(_, v)| v.as_str())
    }

    /// 渲染为 (system, user) 提示对
    pub fn render(&self) -> (String, String) {
        let mut user = String::new();
        for (prefix, value) in &self.inputs {
            user.push_str(prefix);
            user.push(':');
            if value.contains('\n') {
                user.push('\n');
            } else {
                user.push(' ');
            }
            user.push_str(value.trim());
            user.push_str("\n\n");
        }
        if !self.output_prefix.is_empty() {
            user.push_str(&self.output_prefix);
            user.push(':');
        }
        (self.instruction.clone(), user.trim_end().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_orders_inputs() {
        let prompt = PromptFields::new("write_section", "  Write a section.  ")
            .input("Topic", "Acme")
            .input("Collected information", "[1]\nRevenue grew.")
            .output("Section");

        let (system, user) = prompt.render();
        assert_eq!(system, "Write a section.");
        assert_eq!(
            user,
            "Topic: Acme\n\nCollected information:\n[1]\nRevenue grew.\n\nSection:"
        );
        assert_eq!(prompt.get("Topic"), Some("Acme"));
        assert_eq!(prompt.get("Missing"), None);
    }
}
