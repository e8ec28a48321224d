use grader_core::model::{PartLabel, Question};

const WHOLE_QUESTION_INTRO: &str = "\
Your task is to grade a student's solution to an engineering problem.

You will be given the question, a reference solution that is correct, grading
notes, and the student solution.

Respond with a JSON object with these fields:

- \"result\": \"pass\", \"fail\", or \"error\"
- \"full_explanation\": a detailed explanation of your grading reasoning
- \"feedback\": concise (up to 5 sentences), student-facing guidance that helps
  the student improve, without revealing the reference solution or grading notes.

Follow these steps exactly:

1. Read the question, reference solution, grading notes, and student solution.
2. Carefully compare the student solution to the reference solution, using the
   grading notes as guidance.
";

const STEPS_TAIL: &str = "\
3. In \"full_explanation\", first work through your reasoning step by step,
   explaining what is correct and what is incorrect.
4. After you have completed your reasoning, decide the overall correctness:
   - If the solution is correct, set \"result\" to \"pass\".
   - If the solution is incorrect, set \"result\" to \"fail\".
   - If you cannot grade due to missing or inconsistent information, set
     \"result\" to \"error\".
5. In \"feedback\", provide concise (up to 5 sentences), student-facing guidance
   that helps the student improve, without revealing the reference solution or
   grading notes.
";

fn part_intro(label: &str) -> String {
    format!(
        "\
Your task is to grade **part ({label})** of a multi-part engineering problem.
You will be given the entire question, the entire reference solution, and the
entire student solution. Students may mix parts together or refer to earlier
parts. Ignore all parts except the one you are asked to grade.

Respond with a JSON object with these fields:

- \"result\": \"pass\", \"fail\", or \"error\" (applies to part ({label}) only)
- \"full_explanation\": a detailed explanation of your grading reasoning
- \"feedback\": concise (up to 5 sentences), student-facing guidance that helps
  the student improve, without revealing the reference solution or grading notes.

Follow these steps exactly:

1. Extract the student's answer for part ({label}) from the student solution.
   Students may write answers out of order or embed multiple parts together.
   Use your judgment to isolate the portion corresponding to part ({label}).
2. Compare the student's solution for part ({label}) to the corresponding part
   in the reference solution to determine correctness, using the grading notes
   as guidance.
"
    )
}

/// Build the grading prompt for one question and part.
#[must_use]
pub fn build_task_prompt(question: &Question, student_solution: &str, part: &PartLabel) -> String {
    let intro = if part.is_all() {
        WHOLE_QUESTION_INTRO.to_string()
    } else {
        part_intro(part.as_str())
    };

    format!(
        "{intro}{STEPS_TAIL}
-------------------------
QUESTION:
{question}

REFERENCE SOLUTION:
{reference}

GRADING NOTES:
{notes}

STUDENT SOLUTION:
{student_solution}
",
        question = question.text(),
        reference = question.reference_solution(),
        notes = question.grading_notes(),
    )
}
