//! Prompt templates for question and lesson-plan generation.

pub const MCQ_SYSTEM: &str = "You are an experienced teacher who writes clear, \
unambiguous multiple-choice questions. Always answer with a single JSON object \
and nothing else.";

pub const LESSON_PLAN_SYSTEM: &str = "You are an experienced curriculum designer. \
Always answer with a single JSON object and nothing else.";

pub fn mcq_prompt(topic: &str, num_questions: usize) -> String {
    format!(
        r#"Generate {num_questions} multiple-choice questions about the following topic.

Topic: {topic}

Respond with a JSON object of this exact shape:
{{
  "questions": [
    {{
      "question": "the question text",
      "options": ["option A", "option B", "option C", "option D"],
      "answer": "the correct option, copied exactly from options",
      "explanation": "one or two sentences on why the answer is correct"
    }}
  ]
}}"#
    )
}

pub fn lesson_plan_prompt(subject: &str) -> String {
    format!(
        r#"Create a detailed lesson plan for the following subject.

Subject: {subject}

Respond with a JSON object of this exact shape:
{{
  "title": "lesson title",
  "subject": "the subject",
  "learning_objectives": ["objective"],
  "lesson_introduction": "how to open the lesson",
  "main_topics": [
    {{
      "title": "topic title",
      "subtopics": [
        {{
          "title": "subtopic title",
          "key_concepts": ["concept"],
          "discussion_questions": ["question"],
          "hands_on_activities": ["activity"],
          "reflective_questions": ["question"],
          "assessment_ideas": ["idea"]
        }}
      ]
    }}
  ],
  "learning_adaptations": "how to adapt for different learners",
  "real_world_applications": "where this shows up outside the classroom",
  "ethical_considerations": "ethical points worth raising"
}}"#
    )
}
