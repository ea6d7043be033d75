use log::info;

/// Format a parameter count with thousands separators.
pub fn format_parameter_count(name: &str, count: usize) -> String {
    let digits = count.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{}: {} trainable parameters", name, grouped)
}

/// Log the parameter count of a freshly built network at info level.
pub fn log_parameter_count(name: &str, count: usize) {
    info!("{}", format_parameter_count(name, count));
}

/// Format a message reporting the total number of matrix operations.
pub fn format_total_ops(count: usize) -> String {
    format!("Total matrix ops: {}", count)
}

/// Log the total number of matrix operations at info level.
pub fn log_total_ops(count: usize) {
    info!("{}", format_total_ops(count));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_total_ops() {
        assert_eq!(format_total_ops(42), "Total matrix ops: 42");
    }

    #[test]
    fn test_format_parameter_count() {
        assert_eq!(
            format_parameter_count("UNet", 17_263_042),
            "UNet: 17,263,042 trainable parameters"
        );
        assert_eq!(format_parameter_count("x", 999), "x: 999 trainable parameters");
        assert_eq!(format_parameter_count("x", 1000), "x: 1,000 trainable parameters");
    }
}
