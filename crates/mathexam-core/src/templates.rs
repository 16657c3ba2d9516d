//! Deterministic question templates.
//!
//! Each known topic has several variants picked uniformly at random. A variant
//! computes the correct value and a generous pool of near-miss distractors
//! (off-by-one, sign flips, operator mix-ups). The pool is de-duplicated
//! against itself and the correct value, three distractors are drawn, and the
//! four values are shuffled *before* labels are assigned, so the answer label
//! always points at wherever the correct value landed.
//!
//! Every variant's pool holds at least three values distinct from the correct
//! one for all parameter ranges it draws from.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::ids::make_id;
use crate::model::{Question, LABELS};

/// Generate one question for `topic`.
///
/// Known topics (`Algebra`, `Functions`, `Integrals`, `Derivatives`,
/// `Geometry`) match case-insensitively; anything else gets a generic
/// multiplication question. The returned question carries `topic` verbatim.
pub fn generate_question<R: Rng + ?Sized>(topic: &str, rng: &mut R) -> Question {
    match topic.trim().to_lowercase().as_str() {
        "algebra" => algebra(topic, rng),
        "functions" => functions(topic, rng),
        "integrals" => integrals(topic, rng),
        "derivatives" => derivatives(topic, rng),
        "geometry" => geometry(topic, rng),
        _ => arithmetic(topic, rng),
    }
}

/// Whether `topic` has a dedicated template family.
pub fn is_known_topic(topic: &str) -> bool {
    matches!(
        topic.trim().to_lowercase().as_str(),
        "algebra" | "functions" | "integrals" | "derivatives" | "geometry"
    )
}

fn assemble<T, R>(
    topic: &str,
    prompt: String,
    correct: T,
    distractors: &[T],
    rng: &mut R,
) -> Question
where
    T: ToString,
    R: Rng + ?Sized,
{
    let correct = correct.to_string();
    let mut pool: Vec<String> = Vec::with_capacity(distractors.len());
    for candidate in distractors.iter().map(ToString::to_string) {
        if candidate != correct && !pool.contains(&candidate) {
            pool.push(candidate);
        }
    }
    pool.shuffle(rng);
    pool.truncate(LABELS.len() - 1);

    let mut values = pool;
    values.push(correct.clone());
    values.shuffle(rng);

    let correct_idx = values.iter().position(|v| *v == correct).unwrap_or_default();
    let options = LABELS
        .iter()
        .zip(values)
        .map(|(label, value)| (label.to_string(), value))
        .collect();

    Question {
        id: make_id(rng),
        topic: topic.to_string(),
        question: prompt,
        options,
        answer: LABELS[correct_idx].to_string(),
    }
}

fn algebra<R: Rng + ?Sized>(topic: &str, rng: &mut R) -> Question {
    match rng.gen_range(1..=5) {
        1 => {
            let (a, b) = (rng.gen_range(1..=9), rng.gen_range(1..=9));
            let c: i64 = a + b;
            assemble(
                topic,
                format!("What is {a} + {b}?"),
                c,
                &[c + 1, c - 1, c + 2, c - 2, a * b],
                rng,
            )
        }
        2 => {
            let (a, b) = (rng.gen_range(2..=10), rng.gen_range(2..=10));
            let c: i64 = a - b;
            assemble(
                topic,
                format!("What is {a} - {b}?"),
                c,
                &[c + 1, c - 1, c - 2, c + 2, b - a, a + b],
                rng,
            )
        }
        3 => {
            let (a, b) = (rng.gen_range(2..=12), rng.gen_range(2..=12));
            let c: i64 = a * b;
            assemble(
                topic,
                format!("What is {a} × {b}?"),
                c,
                &[c + a, c - b, c + 1, c - 1, a + b],
                rng,
            )
        }
        4 => {
            let x: i64 = rng.gen_range(1..=9);
            let y = 2 * x + 3;
            assemble(
                topic,
                format!("If y = 2x + 3, what is y when x = {x}?"),
                y,
                &[y - 2, y + 2, y + 5, 2 * x - 3, 2 * x],
                rng,
            )
        }
        _ => {
            let x: i64 = rng.gen_range(1..=9);
            let a: i64 = rng.gen_range(2..=5);
            let b: i64 = rng.gen_range(1..=10);
            let c = a * x + b;
            assemble(
                topic,
                format!("Solve for x: {a}x + {b} = {c}"),
                x,
                &[x + 1, x - 1, x + 2, c - b, c + b],
                rng,
            )
        }
    }
}

fn functions<R: Rng + ?Sized>(topic: &str, rng: &mut R) -> Question {
    match rng.gen_range(1..=4) {
        1 => {
            let x: i64 = rng.gen_range(2..=6);
            let fx = 2 * x + 3;
            assemble(
                topic,
                format!("If f(x) = 2x + 3, what is f({x})?"),
                fx,
                &[2 * x - 3, x + 3, 2 * x, 2 * x + 4, 5],
                rng,
            )
        }
        2 => {
            let x: i64 = rng.gen_range(1..=5);
            let fx = x * x;
            assemble(
                topic,
                format!("If f(x) = x^2, what is f({x})?"),
                fx,
                &[2 * x, x * x * x, x + 3, fx + 1, fx - 1],
                rng,
            )
        }
        3 => {
            let x: i64 = rng.gen_range(1..=5);
            let fx = 3 * x - 1;
            assemble(
                topic,
                format!("If f(x) = 3x - 1, what is f({x})?"),
                fx,
                &[3 * x + 1, x + 3, x - 1, 3 * x, 3 * x - 2],
                rng,
            )
        }
        _ => {
            let x: u32 = rng.gen_range(1..=4);
            let fx = 2_i64.pow(x);
            let x_i = i64::from(x);
            assemble(
                topic,
                format!("If f(x) = 2^x, what is f({x})?"),
                fx,
                &[2 * x_i, x_i * x_i, 2_i64.pow(x + 1), fx + 1, fx - 1],
                rng,
            )
        }
    }
}

fn integrals<R: Rng + ?Sized>(topic: &str, rng: &mut R) -> Question {
    let (integrand, correct, distractors): (&str, &str, [&str; 3]) = match rng.gen_range(1..=5) {
        1 => ("2x", "x^2", ["2x^2", "x", "2"]),
        2 => ("x^2", "x^3/3", ["3x^2", "x^2/2", "x^3"]),
        3 => ("1/x", "ln|x|", ["1/x^2", "-1/x^2", "e^x"]),
        4 => ("e^x", "e^x", ["x e^x", "e^(x+1)/(x+1)", "ln x"]),
        _ => ("cos x", "sin x", ["-sin x", "cos x", "-cos x"]),
    };
    assemble(
        topic,
        format!("Compute the indefinite integral ∫ {integrand} dx (ignore the constant)."),
        correct,
        &distractors,
        rng,
    )
}

fn monomial(coef: i64, exp: i64) -> String {
    match exp {
        0 => coef.to_string(),
        1 => format!("{coef}x"),
        _ => format!("{coef}x^{exp}"),
    }
}

fn derivatives<R: Rng + ?Sized>(topic: &str, rng: &mut R) -> Question {
    let variant = rng.gen_range(1..=5);
    if variant == 5 {
        let a: i64 = rng.gen_range(2..=5);
        let n: i64 = rng.gen_range(2..=4);
        return assemble(
            topic,
            format!("What is d/dx of {}?", monomial(a, n)),
            monomial(a * n, n - 1),
            &[
                monomial(a, n - 1),
                monomial(a * n, n),
                monomial(a * n, n - 2),
                monomial(n, n - 1),
            ],
            rng,
        );
    }

    let (function, correct, distractors): (&str, &str, [&str; 3]) = match variant {
        1 => ("x^2", "2x", ["x", "x^2", "2"]),
        2 => ("sin x", "cos x", ["-sin x", "sin x", "-cos x"]),
        3 => ("e^x", "e^x", ["x e^(x-1)", "ln x", "x"]),
        _ => ("ln x", "1/x", ["x", "e^x", "0"]),
    };
    assemble(
        topic,
        format!("What is d/dx of {function}?"),
        correct,
        &distractors,
        rng,
    )
}

fn geometry<R: Rng + ?Sized>(topic: &str, rng: &mut R) -> Question {
    let variant = rng.gen_range(1..=5);
    if variant == 5 {
        let (w, h): (i64, i64) = (rng.gen_range(2..=9), rng.gen_range(2..=9));
        let area = w * h;
        return assemble(
            topic,
            format!("What is the area of a {w} by {h} rectangle?"),
            area,
            &[2 * (w + h), w + h, area + 1, area - 1, area + w],
            rng,
        );
    }

    let (prompt, correct, distractors): (&str, &str, [&str; 3]) = match variant {
        1 => (
            "What is the sum of the interior angles of a triangle?",
            "180°",
            ["90°", "270°", "360°"],
        ),
        2 => (
            "What is the area of a circle with radius r?",
            "πr^2",
            ["2πr", "πd", "r^2/2"],
        ),
        3 => (
            "What is the area of a trapezoid with bases a, b and height h?",
            "(a+b)/2 * h",
            ["a*b", "(a+b+h)", "2ab"],
        ),
        _ => (
            "Which statement is the Pythagorean theorem (c is the hypotenuse)?",
            "a^2 + b^2 = c^2",
            ["a^2 = b^2 + c^2", "a + b = c", "ab = c^2"],
        ),
    };
    assemble(topic, prompt.to_string(), correct, &distractors, rng)
}

fn arithmetic<R: Rng + ?Sized>(topic: &str, rng: &mut R) -> Question {
    let (a, b): (i64, i64) = (rng.gen_range(1..=9), rng.gen_range(1..=9));
    let c = a * b;
    assemble(
        topic,
        format!("What is {a} × {b}?"),
        c,
        &[c + 1, c - 1, c + 2, a + b],
        rng,
    )
}
