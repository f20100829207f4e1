/// Consecutive ASCII digit runs in `text`, in order of appearance.
pub fn digit_runs(text: &str) -> Vec<String> {
    let mut runs = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if ch.is_ascii_digit() {
            current.push(ch);
        } else if !current.is_empty() {
            runs.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}

pub fn first_digit_run(text: &str, min_len: usize, max_len: usize) -> Option<String> {
    digit_runs(text)
        .into_iter()
        .find(|run| run.len() >= min_len && run.len() <= max_len)
}

pub fn is_digits(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|ch| ch.is_ascii_digit())
}
