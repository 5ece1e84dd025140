use serde_json::Value;

/// Evaluate a named property check against a candidate's output/input pair.
/// Unknown check names are treated as satisfied -- forward compatibility:
/// the Solver/Critic are free to reject a candidate on other metrics, but
/// the runner itself never fails a case just because it doesn't recognize
/// a check name.
pub fn evaluate_check(name: &str, input: &Value, output: &Value) -> bool {
    match name {
        "sorted_non_decreasing" => sorted_non_decreasing(output),
        "permutes" => permutes(input, output),
        _ => true,
    }
}

fn sorted_non_decreasing(output: &Value) -> bool {
    let Some(seq) = output.get("sorted").and_then(Value::as_array) else {
        return false;
    };
    let nums: Option<Vec<f64>> = seq.iter().map(Value::as_f64).collect();
    let Some(nums) = nums else { return false };
    nums.windows(2).all(|w| w[0] <= w[1])
}

fn permutes(input: &Value, output: &Value) -> bool {
    let (Some(input_nums), Some(output_nums)) = (
        input.get("numbers").and_then(Value::as_array),
        output.get("sorted").and_then(Value::as_array),
    ) else {
        return false;
    };
    if input_nums.len() != output_nums.len() {
        return false;
    }
    let mut a: Vec<String> = input_nums.iter().map(|v| v.to_string()).collect();
    let mut b: Vec<String> = output_nums.iter().map(|v| v.to_string()).collect();
    a.sort();
    b.sort();
    a == b
}
